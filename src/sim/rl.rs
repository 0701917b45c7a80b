//! Tabular Q-learning dispatch policy (§4.8), plus the episodic training
//! wrapper (§4.8.1).
//!
//! Implemented as a `Policy` (`sim::dispatch`) with interior-mutable learned
//! state, since unlike the heuristics it must update across calls. RNG usage
//! follows the rest of the crate's seeded `StdRng` convention.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use rand::Rng;
use rand::rngs::StdRng;

use crate::geo::{Park, hour_of_day};
use crate::sim::dispatch::{Policy, ZoneCoverage};
use crate::sim::entities::{Battery, BatteryId, Robot, RobotStatus, Vehicle, VehicleId, VehicleStatus};

const MIN_DISPATCH_CHARGE: f64 = 15.0;
const FIXED_SAFETY_MARGIN: f64 = 1.3;
const NEARBY_RADIUS: f64 = 300.0;
const NEARBY_CAP: u8 = 8;
const URGENT_CAP: u8 = 3;
const URGENT_THRESHOLD: f64 = 30.0;

const ALPHA: f64 = 0.2;
const GAMMA: f64 = 0.8;
const INITIAL_EPSILON: f64 = 0.15;
const EPSILON_DECAY: f64 = 0.95;
const EPSILON_FLOOR: f64 = 0.05;
const EPISODES_PER_DECAY: u32 = 5;
const ROLLING_WINDOW: usize = 5;

/// The discretized state (§4.8): position bin, battery band, local vehicle
/// pressure, and time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    pos_x: i32,
    pos_y: i32,
    battery_level: u8,
    nearby: u8,
    urgent: u8,
    time_period: u8,
}

fn battery_level(charge: Option<f64>) -> u8 {
    match charge {
        None => 0,
        Some(c) if c < 10.0 => 1,
        Some(c) if c < 20.0 => 2,
        Some(c) if c < 30.0 => 3,
        Some(c) if c < 45.0 => 4,
        Some(_) => 5,
    }
}

fn time_period(minute: u32) -> u8 {
    match hour_of_day(minute) {
        6..=11 => 0,
        12..=17 => 1,
        18..=22 => 2,
        _ => 3,
    }
}

fn encode_state(robot: &Robot, battery_charge: Option<f64>, waiting: &[&Vehicle], now: u32) -> State {
    let mut nearby = 0u8;
    let mut urgent = 0u8;
    for v in waiting {
        let dist = robot.distance_to(v.position);
        if dist < NEARBY_RADIUS {
            nearby = (nearby + 1).min(NEARBY_CAP);
            if (v.departure_minute as i64 - now as i64) < URGENT_THRESHOLD as i64 {
                urgent = (urgent + 1).min(URGENT_CAP);
            }
        }
    }

    State {
        pos_x: (robot.position.x / 200.0) as i32,
        pos_y: (robot.position.y / 200.0) as i32,
        battery_level: battery_level(battery_charge),
        nearby,
        urgent,
        time_period: time_period(now),
    }
}

fn battery_charge(batteries: &[Battery], id: Option<BatteryId>) -> Option<f64> {
    id.and_then(|id| batteries.iter().find(|b| b.id == id)).map(|b| b.current_charge)
}

/// A vehicle assignment awaiting an outcome (completion or failure) before its
/// reward can be finalized and folded into the Q-table.
struct Pending {
    state: State,
    next_state: State,
    distance_penalty: f64,
    energy_penalty: f64,
}

/// A summary of one training episode, returned so the caller can log it.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeLog {
    pub episode: u32,
    pub total_reward: f64,
    pub rolling_mean: f64,
    pub epsilon: f64,
}

/// Tabular Q-learning policy. Shares the heuristics' 30%-margin feasibility
/// gate at selection time, then learns from the eventual outcome.
pub struct RlPolicy {
    q_table: RefCell<HashMap<State, HashMap<VehicleId, f64>>>,
    pending: RefCell<HashMap<VehicleId, Pending>>,
    rng: RefCell<StdRng>,
    epsilon: Cell<f64>,
    episode_reward: Cell<f64>,
    episode_count: Cell<u32>,
    reward_history: RefCell<VecDeque<f64>>,
}

impl RlPolicy {
    pub fn new(rng: StdRng) -> Self {
        Self {
            q_table: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
            rng: RefCell::new(rng),
            epsilon: Cell::new(INITIAL_EPSILON),
            episode_reward: Cell::new(0.0),
            episode_count: Cell::new(0),
            reward_history: RefCell::new(VecDeque::with_capacity(ROLLING_WINDOW)),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon.get()
    }

    /// Resets the per-episode reward accumulator. Q-table and ε persist.
    pub fn begin_episode(&self) {
        self.episode_reward.set(0.0);
    }

    /// Finalizes the current episode: decays ε every 5 episodes (floored at
    /// 0.05) and returns a summary for logging (§4.8.1).
    pub fn finish_episode(&self) -> EpisodeLog {
        let episode = self.episode_count.get() + 1;
        self.episode_count.set(episode);

        let total_reward = self.episode_reward.get();
        {
            let mut history = self.reward_history.borrow_mut();
            if history.len() == ROLLING_WINDOW {
                history.pop_front();
            }
            history.push_back(total_reward);
        }

        if episode % EPISODES_PER_DECAY == 0 && self.epsilon.get() > EPSILON_FLOOR {
            self.epsilon.set(self.epsilon.get() * EPSILON_DECAY);
        }

        let history = self.reward_history.borrow();
        let rolling_mean = history.iter().sum::<f64>() / history.len() as f64;

        EpisodeLog { episode, total_reward, rolling_mean, epsilon: self.epsilon.get() }
    }

    fn q_value(&self, state: State, vehicle_id: VehicleId) -> f64 {
        self.q_table.borrow().get(&state).and_then(|actions| actions.get(&vehicle_id)).copied().unwrap_or(0.0)
    }

    fn max_q(&self, state: State) -> f64 {
        self.q_table.borrow().get(&state).and_then(|actions| actions.values().copied().reduce(f64::max)).unwrap_or(0.0)
    }

    fn update_q(&self, state: State, vehicle_id: VehicleId, reward: f64, next_state: State) {
        let max_next_q = self.max_q(next_state);
        let mut table = self.q_table.borrow_mut();
        let actions = table.entry(state).or_default();
        let old_value = *actions.get(&vehicle_id).unwrap_or(&0.0);
        actions.insert(vehicle_id, old_value + ALPHA * (reward + GAMMA * max_next_q - old_value));
    }

    /// ε-greedy action selection over `waiting`, per §4.8.
    fn select_vehicle<'a>(&self, state: State, waiting: &[&'a Vehicle], now: u32) -> Option<&'a Vehicle> {
        if waiting.is_empty() {
            return None;
        }

        let explore = self.rng.borrow_mut().random::<f64>() < self.epsilon.get();
        if explore {
            let weights: Vec<f64> = waiting
                .iter()
                .map(|v| {
                    let time_left = (v.departure_minute as i64 - now as i64).max(1) as f64;
                    if time_left < 30.0 {
                        5.0
                    } else if time_left < 60.0 {
                        3.0
                    } else {
                        1.0
                    }
                })
                .collect();
            return Some(self.weighted_choice(waiting, &weights));
        }

        let table = self.q_table.borrow();
        let Some(actions) = table.get(&state) else {
            drop(table);
            return Some(waiting[self.rng.borrow_mut().random_range(0..waiting.len())]);
        };

        let scored: Vec<(&Vehicle, f64)> =
            waiting.iter().filter_map(|&v| actions.get(&v.id).map(|&q| (v, q))).collect();
        drop(table);

        if scored.is_empty() {
            return Some(waiting[self.rng.borrow_mut().random_range(0..waiting.len())]);
        }

        let max_q = scored.iter().map(|(_, q)| *q).fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = scored.iter().map(|(_, q)| ((q - max_q) * 2.0).exp()).collect();
        let vehicles: Vec<&Vehicle> = scored.iter().map(|(v, _)| *v).collect();
        Some(self.weighted_choice(&vehicles, &weights))
    }

    fn weighted_choice<'a>(&self, items: &[&'a Vehicle], weights: &[f64]) -> &'a Vehicle {
        let total: f64 = weights.iter().sum();
        let mut pick = self.rng.borrow_mut().random::<f64>() * total;
        for (item, weight) in items.iter().zip(weights) {
            if pick < *weight {
                return item;
            }
            pick -= weight;
        }
        items[items.len() - 1]
    }
}

impl Policy for RlPolicy {
    fn name(&self) -> &'static str {
        "rl"
    }

    fn assign_tasks(
        &self,
        now: u32,
        vehicles: &mut [Vehicle],
        robots: &mut [Robot],
        batteries: &[Battery],
        park: &Park,
        _zone_coverage: &ZoneCoverage,
    ) {
        let mut robot_indices: Vec<usize> = robots
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.status == RobotStatus::Idle
                    && battery_charge(batteries, r.battery).is_some_and(|c| c > MIN_DISPATCH_CHARGE)
            })
            .map(|(i, _)| i)
            .collect();
        robot_indices.sort_by(|&a, &b| {
            let ca = battery_charge(batteries, robots[a].battery).unwrap_or(0.0);
            let cb = battery_charge(batteries, robots[b].battery).unwrap_or(0.0);
            cb.total_cmp(&ca)
        });

        for robot_idx in robot_indices {
            let waiting_idx: Vec<usize> =
                vehicles.iter().enumerate().filter(|(_, v)| v.status == VehicleStatus::Waiting).map(|(i, _)| i).collect();
            if waiting_idx.is_empty() {
                break;
            }

            let waiting_refs: Vec<&Vehicle> = waiting_idx.iter().map(|&i| &vehicles[i]).collect();
            let battery = battery_charge(batteries, robots[robot_idx].battery);
            let state = encode_state(&robots[robot_idx], battery, &waiting_refs, now);

            let Some(chosen) = self.select_vehicle(state, &waiting_refs, now) else { continue };
            let vehicle_idx = vehicles.iter().position(|v| v.id == chosen.id).expect("chosen vehicle exists");

            let travel_time = robots[robot_idx].time_to_reach(vehicles[vehicle_idx].position);
            let charge_time = vehicles[vehicle_idx].needed_charge_time();
            if now as f64 + travel_time + charge_time > vehicles[vehicle_idx].departure_minute as f64 {
                self.update_q(state, vehicles[vehicle_idx].id, -5.0, state);
                continue;
            }

            let vehicle_id = vehicles[vehicle_idx].id;
            let charge_need = (vehicles[vehicle_idx].required_energy - vehicles[vehicle_idx].current_energy).max(0.0);
            let trip_to_vehicle = robots[robot_idx].energy_for_trip(vehicles[vehicle_idx].position, vehicles[vehicle_idx].position, false);
            let nearest_station = park.nearest_station(robots[robot_idx].position);
            let trip_back = robots[robot_idx].energy_for_trip(nearest_station, nearest_station, false);
            let total_energy_needed = trip_to_vehicle + charge_need * 0.5 + trip_back;

            if battery.is_some_and(|c| c > total_energy_needed * FIXED_SAFETY_MARGIN) {
                let distance = robots[robot_idx].distance_to(vehicles[vehicle_idx].position);
                let distance_penalty = (distance / 100.0).min(10.0);

                let round_trip_energy =
                    robots[robot_idx].energy_for_trip(vehicles[vehicle_idx].position, nearest_station, true) + charge_need * 0.5;
                let energy_penalty = if battery.unwrap_or(0.0) < round_trip_energy {
                    -8.0
                } else if battery.unwrap_or(0.0) < round_trip_energy * 1.3 {
                    -3.0
                } else {
                    0.0
                };

                robots[robot_idx].status = RobotStatus::MovingToVehicle;
                robots[robot_idx].target_vehicle = Some(vehicle_id);
                robots[robot_idx].last_assigned_minute = now;
                vehicles[vehicle_idx].status = VehicleStatus::Assigned;
                vehicles[vehicle_idx].assigned_robot = Some(robots[robot_idx].id);

                let remaining: Vec<&Vehicle> = vehicles.iter().filter(|v| v.status == VehicleStatus::Waiting).collect();
                let next_state = encode_state(&robots[robot_idx], battery, &remaining, now);

                self.pending.borrow_mut().insert(
                    vehicle_id,
                    Pending { state, next_state, distance_penalty: -distance_penalty, energy_penalty },
                );
            } else {
                self.update_q(state, vehicle_id, -8.0, state);
            }
        }
    }

    fn on_vehicle_completed(&self, _robot: &Robot, vehicle: &Vehicle, now: u32) {
        let Some(pending) = self.pending.borrow_mut().remove(&vehicle.id) else { return };

        let charge_added = vehicle.current_energy - vehicle.initial_energy;
        let charge_reward = charge_added * 0.2;
        let time_efficiency = match vehicle.charging_start_minute {
            Some(start) => {
                let charging_time = (now as i64 - start as i64).max(0) as f64;
                (10.0 - (charging_time / 30.0).min(9.0)).max(1.0)
            }
            None => 1.0,
        };
        let completion_reward = 20.0 + charge_reward + time_efficiency;

        let time_left_at_start = vehicle
            .charging_start_minute
            .map(|start| vehicle.departure_minute as i64 - start as i64)
            .unwrap_or(i64::MAX);
        let urgency_reward = if time_left_at_start < 30 {
            10.0
        } else if time_left_at_start < 60 {
            5.0
        } else {
            0.0
        };

        let waiting_time = vehicle
            .charging_start_minute
            .map(|start| (start as i64 - vehicle.arrival_minute as i64).max(0) as f64)
            .unwrap_or(0.0);
        let waiting_reward = if waiting_time > 60.0 { 5.0 } else { 0.0 };

        let reward =
            completion_reward + urgency_reward + pending.distance_penalty + pending.energy_penalty + waiting_reward;

        self.episode_reward.set(self.episode_reward.get() + reward);
        self.update_q(pending.state, vehicle.id, reward, pending.next_state);
    }

    fn on_vehicle_failed(&self, vehicle: &Vehicle, _now: u32) {
        let Some(pending) = self.pending.borrow_mut().remove(&vehicle.id) else { return };
        let reward = -15.0 + pending.distance_penalty + pending.energy_penalty;
        self.episode_reward.set(self.episode_reward.get() + reward);
        self.update_q(pending.state, vehicle.id, reward, pending.next_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;
    use rand::SeedableRng;

    fn make_robot(id: crate::sim::entities::RobotId, pos: Point, battery_id: BatteryId) -> Robot {
        let mut r = Robot::new(id, pos);
        r.battery = Some(battery_id);
        r
    }

    fn make_battery(id: BatteryId, charge: f64) -> Battery {
        let mut b = Battery::new(id, 60.0, Point::new(0.0, 0.0));
        b.current_charge = charge;
        b
    }

    #[test]
    fn battery_level_bands() {
        assert_eq!(battery_level(None), 0);
        assert_eq!(battery_level(Some(5.0)), 1);
        assert_eq!(battery_level(Some(15.0)), 2);
        assert_eq!(battery_level(Some(25.0)), 3);
        assert_eq!(battery_level(Some(40.0)), 4);
        assert_eq!(battery_level(Some(50.0)), 5);
    }

    #[test]
    fn time_period_bands() {
        assert_eq!(time_period(7 * 60), 0);
        assert_eq!(time_period(13 * 60), 1);
        assert_eq!(time_period(19 * 60), 2);
        assert_eq!(time_period(2 * 60), 3);
    }

    #[test]
    fn epsilon_decays_every_five_episodes_with_floor() {
        let policy = RlPolicy::new(StdRng::seed_from_u64(1));
        for _ in 0..4 {
            policy.begin_episode();
            let log = policy.finish_episode();
            assert!((log.epsilon - INITIAL_EPSILON).abs() < 1e-9);
        }
        policy.begin_episode();
        let log = policy.finish_episode();
        assert!((log.epsilon - INITIAL_EPSILON * EPSILON_DECAY).abs() < 1e-9);
    }

    #[test]
    fn feasible_assignment_records_pending_and_updates_on_completion() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let policy = RlPolicy::new(StdRng::seed_from_u64(42));
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(10.0, 10.0), 50.0, 500, 60.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        policy.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);
        assert_eq!(vehicles[0].status, VehicleStatus::Assigned);
        assert!(policy.pending.borrow().contains_key(&0));

        vehicles[0].current_energy = vehicles[0].required_energy;
        vehicles[0].charging_start_minute = Some(1);
        policy.on_vehicle_completed(&robots[0], &vehicles[0], 10);

        assert!(policy.pending.borrow().is_empty());
        assert!(policy.episode_reward.get() > 0.0);
    }

    #[test]
    fn infeasible_deadline_updates_q_table_without_assigning() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let policy = RlPolicy::new(StdRng::seed_from_u64(7));
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(999.0, 999.0), 10.0, 2, 90.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        policy.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);
        assert_eq!(vehicles[0].status, VehicleStatus::Waiting);
    }
}
