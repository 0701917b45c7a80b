//! Vehicle, Battery, and Robot: the data model of §3, with their small pure helpers.

use serde::{Deserialize, Serialize};

use crate::geo::Point;

pub type VehicleId = u32;
pub type BatteryId = u32;
pub type RobotId = u32;

/// Vehicle max energy capacity, used by the charge-rate curve (§4.3).
pub const VEHICLE_MAX_ENERGY: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    Waiting,
    Assigned,
    Charging,
    Completed,
    Failed,
}

/// An electric vehicle that arrives, dwells, and must be recharged before departure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub arrival_minute: u32,
    pub position: Point,
    pub initial_energy: f64,
    pub current_energy: f64,
    pub departure_minute: u32,
    pub required_energy: f64,
    pub status: VehicleStatus,
    pub assigned_robot: Option<RobotId>,
    pub charging_start_minute: Option<u32>,
    pub charging_end_minute: Option<u32>,
    pub priority: f64,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        arrival_minute: u32,
        position: Point,
        initial_energy: f64,
        departure_minute: u32,
        required_energy: f64,
    ) -> Self {
        assert!(departure_minute > arrival_minute, "vehicle must dwell for a positive duration");
        assert!(
            (0.0..=VEHICLE_MAX_ENERGY).contains(&initial_energy),
            "initial energy out of bounds"
        );
        Self {
            id,
            arrival_minute,
            position,
            initial_energy,
            current_energy: initial_energy,
            departure_minute,
            required_energy,
            status: VehicleStatus::Waiting,
            assigned_robot: None,
            charging_start_minute: None,
            charging_end_minute: None,
            priority: 0.0,
        }
    }

    /// Charge-rate curve f(e) (§4.3): kWh/min deliverable at the vehicle's current SoC.
    pub fn charge_rate(&self) -> f64 {
        charge_rate_at(self.current_energy)
    }

    /// Needed-charge-time integral (§4.3): minutes to go from `current_energy` to
    /// `required_energy` under the piecewise curve, ignoring efficiency noise.
    pub fn needed_charge_time(&self) -> f64 {
        needed_charge_time(self.current_energy, self.required_energy)
    }

    pub fn time_left(&self, now: u32) -> i64 {
        self.departure_minute as i64 - now as i64
    }

    /// Priority formula (§4.3). Higher is more urgent.
    pub fn update_priority(&mut self, now: u32) -> f64 {
        let urgency = (self.departure_minute as i64 - now as i64).max(1) as f64;
        let need = (self.required_energy - self.current_energy).max(0.0);
        let wait = (now as i64 - self.arrival_minute as i64).max(0) as f64;
        let factor = if urgency < 30.0 { 10.0 } else { 1.0 };
        self.priority = (need / urgency) * factor + wait / 60.0;
        self.priority
    }
}

/// Charge-rate curve f(e), §4.3: 2.5 kWh/min below 50% SoC, 1.8 below 80%, 0.8 above.
pub fn charge_rate_at(energy: f64) -> f64 {
    let pct = energy / VEHICLE_MAX_ENERGY;
    if pct < 0.5 {
        2.5
    } else if pct < 0.8 {
        1.8
    } else {
        0.8
    }
}

/// Integrates `charge_rate_at` piecewise from `current` to `required`.
pub fn needed_charge_time(current: f64, required: f64) -> f64 {
    let needed = required - current;
    if needed <= 0.0 {
        return 0.0;
    }

    let mut current_pct = current / VEHICLE_MAX_ENERGY;
    let required_pct = required / VEHICLE_MAX_ENERGY;
    let mut minutes = 0.0;

    if current_pct < 0.5 && required_pct > 0.5 {
        let delta = (0.5 - current_pct) * VEHICLE_MAX_ENERGY;
        minutes += delta / 2.5;
        current_pct = 0.5;
    }
    if current_pct < 0.8 && required_pct > 0.8 {
        let delta = (0.8 - current_pct.max(0.5)) * VEHICLE_MAX_ENERGY;
        minutes += delta / 1.8;
        current_pct = 0.8;
    }
    if required_pct > 0.8 {
        let delta = (required_pct - current_pct.max(0.8)) * VEHICLE_MAX_ENERGY;
        minutes += delta / 0.8;
    }

    minutes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    Available,
    InUse,
    Charging,
}

/// A swappable battery pack carried by a robot, recharged at a station when depleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battery {
    pub id: BatteryId,
    pub max_capacity: f64,
    pub current_charge: f64,
    pub status: BatteryStatus,
    pub location: Point,
    pub assigned_robot: Option<RobotId>,
    pub home_station: Point,
    pub charge_start_minute: Option<u32>,
}

/// Battery capacity default, grounded on the reference's `Battery(max_capacity=60.0)`.
pub const DEFAULT_BATTERY_CAPACITY: f64 = 60.0;

/// Fraction of capacity at which a recharging battery is returned to service (§3).
pub const BATTERY_RECHARGE_THRESHOLD: f64 = 0.95;

impl Battery {
    pub fn new(id: BatteryId, max_capacity: f64, home_station: Point) -> Self {
        assert!(max_capacity > 0.0, "battery capacity must be positive");
        Self {
            id,
            max_capacity,
            current_charge: max_capacity,
            status: BatteryStatus::Available,
            location: home_station,
            assigned_robot: None,
            home_station,
            charge_start_minute: None,
        }
    }

    /// Recharge-rate curve g(c), §4.4: 2.0 kWh/min below 50% SoC, 1.5 below 80%, 1.0 above.
    pub fn recharge_rate(&self) -> f64 {
        let pct = self.current_charge / self.max_capacity;
        if pct < 0.5 {
            2.0
        } else if pct < 0.8 {
            1.5
        } else {
            1.0
        }
    }

    pub fn is_full_enough(&self) -> bool {
        self.current_charge / self.max_capacity >= BATTERY_RECHARGE_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    MovingToVehicle,
    ChargingVehicle,
    Returning,
    SwappingBattery,
}

/// A mobile charging robot: carries a battery, moves to vehicles, transfers energy,
/// and returns to a station to swap a depleted pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub id: RobotId,
    pub home_station: Point,
    pub position: Point,
    pub battery: Option<BatteryId>,
    pub status: RobotStatus,
    pub target_vehicle: Option<VehicleId>,
    pub speed: f64,
    pub moving_energy_rate: f64,
    pub idling_energy_rate: f64,
    pub last_assigned_minute: u32,
    /// Minutes accumulated in `MovingToVehicle` or `ChargingVehicle`, for utilization stats.
    pub busy_minutes: u32,
}

/// Reference defaults for robot motion and energy consumption.
pub const DEFAULT_ROBOT_SPEED: f64 = 8.0;
pub const DEFAULT_MOVING_ENERGY_RATE: f64 = 0.04;
pub const DEFAULT_IDLING_ENERGY_RATE: f64 = 0.005;

impl Robot {
    pub fn new(id: RobotId, home_station: Point) -> Self {
        Self {
            id,
            home_station,
            position: home_station,
            battery: None,
            status: RobotStatus::Idle,
            target_vehicle: None,
            speed: DEFAULT_ROBOT_SPEED,
            moving_energy_rate: DEFAULT_MOVING_ENERGY_RATE,
            idling_energy_rate: DEFAULT_IDLING_ENERGY_RATE,
            last_assigned_minute: 0,
            busy_minutes: 0,
        }
    }

    pub fn distance_to(&self, p: Point) -> f64 {
        self.position.distance_to(p)
    }

    pub fn time_to_reach(&self, p: Point) -> f64 {
        if self.speed > 0.0 {
            self.distance_to(p) / self.speed
        } else {
            f64::INFINITY
        }
    }

    /// Battery energy needed for a one-way (or round) trip to `p`, §4.5/§4.4.
    pub fn energy_for_trip(&self, p: Point, nearest_station: Point, round_trip: bool) -> f64 {
        let one_way_time = self.time_to_reach(p);
        let total_time = if round_trip {
            let back_time = p.distance_to(nearest_station) / self.speed;
            one_way_time + back_time
        } else {
            one_way_time
        };
        total_time * self.moving_energy_rate
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, RobotStatus::MovingToVehicle | RobotStatus::ChargingVehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_rate_bands() {
        assert_eq!(charge_rate_at(0.0), 2.5);
        assert_eq!(charge_rate_at(49.0), 2.5);
        assert_eq!(charge_rate_at(50.0), 1.8);
        assert_eq!(charge_rate_at(79.0), 1.8);
        assert_eq!(charge_rate_at(80.0), 0.8);
        assert_eq!(charge_rate_at(99.0), 0.8);
    }

    #[test]
    fn needed_charge_time_within_single_band() {
        // 10 kWh at the fast-charge rate of 2.5/min.
        assert!((needed_charge_time(0.0, 10.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn needed_charge_time_crosses_bands() {
        // 0 -> 50 at 2.5/min (20 min), 50 -> 80 at 1.8/min (~16.667 min).
        let t = needed_charge_time(0.0, 80.0);
        let expected = 50.0 / 2.5 + 30.0 / 1.8;
        assert!((t - expected).abs() < 1e-6);
    }

    #[test]
    fn needed_charge_time_non_positive_when_already_sufficient() {
        assert_eq!(needed_charge_time(90.0, 80.0), 0.0);
    }

    #[test]
    fn priority_gives_urgency_bonus_under_thirty_minutes() {
        let mut v = Vehicle::new(1, 0, Point::new(0.0, 0.0), 50.0, 20, 80.0);
        let p = v.update_priority(10);
        // urgency = 10 (<30 -> factor 10), need = 30, wait = 10/60
        let expected = (30.0 / 10.0) * 10.0 + 10.0 / 60.0;
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn battery_recharge_rate_bands() {
        let mut b = Battery::new(1, 60.0, Point::new(0.0, 0.0));
        b.current_charge = 10.0;
        assert_eq!(b.recharge_rate(), 2.0);
        b.current_charge = 40.0;
        assert_eq!(b.recharge_rate(), 1.5);
        b.current_charge = 55.0;
        assert_eq!(b.recharge_rate(), 1.0);
    }

    #[test]
    fn battery_full_enough_threshold() {
        let mut b = Battery::new(1, 60.0, Point::new(0.0, 0.0));
        b.current_charge = 56.0; // 93.3%
        assert!(!b.is_full_enough());
        b.current_charge = 57.5; // 95.8%
        assert!(b.is_full_enough());
    }

    #[test]
    fn robot_new_starts_idle_at_home() {
        let home = Point::new(50.0, 50.0);
        let r = Robot::new(1, home);
        assert_eq!(r.position, home);
        assert_eq!(r.status, RobotStatus::Idle);
        assert!(r.battery.is_none());
    }
}
