//! The arrival generator (§4.2): a time-inhomogeneous Poisson process producing
//! vehicle arrivals over the horizon, with position and dwell conditioned on
//! time-of-day.
//!
//! Grounded on `devices/ev_charger.rs`'s `StdRng`-seeded session sampling and
//! `devices/baseload.rs`'s time-of-day-conditioned pattern. Poisson sampling is
//! hand-rolled (Knuth's algorithm) since no pack example pulls in a distributions
//! crate for this.

use rand::Rng;
use rand::rngs::StdRng;

use crate::geo::{Park, Point, hour_of_day};
use crate::sim::entities::{Vehicle, VehicleId};

const MORNING_PEAK_START: u32 = 7 * 60;
const MORNING_PEAK_END: u32 = 10 * 60;
const EVENING_PEAK_START: u32 = 17 * 60;
const EVENING_PEAK_END: u32 = 20 * 60;

/// Knuth's algorithm for sampling a Poisson-distributed count with mean `lambda`.
fn sample_poisson(rng: &mut StdRng, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    let l = (-lambda).exp();
    let mut k = 0;
    let mut p = 1.0;
    loop {
        k += 1;
        p *= rng.random::<f64>();
        if p <= l {
            return k - 1;
        }
    }
}

/// Arrival rate λ(m) (vehicles/minute) for minute `m`, given the scale's
/// `vehicles_per_hour` base rate (§4.2).
fn arrival_rate(minute: u32, base_per_hour: f64) -> f64 {
    let hour = hour_of_day(minute);
    let in_morning_peak = (MORNING_PEAK_START..MORNING_PEAK_END).contains(&minute);
    let in_evening_peak = (EVENING_PEAK_START..EVENING_PEAK_END).contains(&minute);

    if in_morning_peak || in_evening_peak {
        (base_per_hour / 60.0) * 1.5
    } else if hour >= 23 || hour < 6 {
        base_per_hour / 180.0
    } else {
        base_per_hour / 60.0
    }
}

fn sample_position(park: &Park, rng: &mut StdRng) -> Point {
    if rng.random::<f64>() < 0.4 {
        let fractions = [0.25, 0.5, 0.75];
        let road_x = park.width * fractions[rng.random_range(0..3)];
        let road_y = park.height * fractions[rng.random_range(0..3)];
        let jitter_x = rng.random_range(-100.0..=100.0);
        let jitter_y = rng.random_range(-100.0..=100.0);
        Point::new(road_x + jitter_x, road_y + jitter_y).clamp_to(park.width, park.height)
    } else {
        Point::new(rng.random_range(0.0..=park.width), rng.random_range(0.0..=park.height))
    }
}

fn sample_dwell(minute: u32, rng: &mut StdRng) -> u32 {
    if (MORNING_PEAK_START..MORNING_PEAK_END).contains(&minute) {
        rng.random_range(180..=480)
    } else if (EVENING_PEAK_START..EVENING_PEAK_END).contains(&minute) {
        rng.random_range(60..=240)
    } else {
        rng.random_range(30..=360)
    }
}

/// Samples `(initial_energy, required_energy)` conditioned on dwell length (§4.2).
fn sample_energies(dwell: u32, rng: &mut StdRng) -> (f64, f64) {
    if dwell > 240 {
        (rng.random_range(5.0..=30.0), rng.random_range(70.0..=95.0))
    } else {
        (rng.random_range(15.0..=50.0), rng.random_range(60.0..=85.0))
    }
}

/// Generates every vehicle arrival over `[0, horizon)` minutes.
///
/// Returns vehicles in ascending arrival-minute order (ties broken by id, matching
/// the order they were sampled), ready to be pushed onto the event queue.
pub fn generate_arrivals(
    park: &Park,
    horizon: u32,
    vehicles_per_hour: f64,
    rng: &mut StdRng,
) -> Vec<Vehicle> {
    let mut vehicles = Vec::new();
    let mut next_id: VehicleId = 0;

    for minute in 0..horizon {
        let lambda = arrival_rate(minute, vehicles_per_hour);
        let count = sample_poisson(rng, lambda);
        for _ in 0..count {
            let position = sample_position(park, rng);
            let dwell = sample_dwell(minute, rng);
            let departure = minute + dwell;
            let (initial_energy, required_energy) = sample_energies(dwell, rng);

            vehicles.push(Vehicle::new(
                next_id,
                minute,
                position,
                initial_energy,
                departure,
                required_energy,
            ));
            next_id += 1;
        }
    }

    vehicles
}
