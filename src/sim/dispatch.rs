//! Dispatch policies (§4.5): pluggable strategies that match idle robots to
//! waiting vehicles, sharing one feasibility predicate.
//!
//! A single dispatcher trait, generalized from one naive real-time
//! controller into a set of interchangeable policies: five heuristic
//! strategies plus a learned one, all sharing one feasibility predicate.

use std::collections::HashMap;

use crate::geo::{Park, Zone};
use crate::sim::entities::{Battery, BatteryId, Robot, RobotStatus, Vehicle, VehicleStatus};

/// Minimum battery charge (kWh) a robot must hold to be considered for dispatch.
const MIN_DISPATCH_CHARGE: f64 = 15.0;

/// Fixed safety margin used by every heuristic except the hybrid policy, which
/// varies it with the robot's own battery level (§4.5).
const FIXED_SAFETY_MARGIN: f64 = 1.3;

/// Tracks how many vehicles have been routed into each quadrant, feeding the
/// hybrid policy's area-balance term.
#[derive(Debug, Clone, Default)]
pub struct ZoneCoverage(HashMap<Zone, u32>);

impl ZoneCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, zone: Zone) {
        *self.0.entry(zone).or_insert(0) += 1;
    }

    pub fn count(&self, zone: Zone) -> u32 {
        *self.0.get(&zone).unwrap_or(&0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

fn battery_charge(batteries: &[Battery], id: BatteryId) -> f64 {
    batteries.iter().find(|b| b.id == id).map(|b| b.current_charge).unwrap_or(0.0)
}

/// Total energy a robot would spend to reach `vehicle`, deliver `charge_need`
/// at half efficiency, then return to the nearest station from its *current*
/// position (computed before it moves, matching the reference).
fn total_energy_needed(robot: &Robot, vehicle: &Vehicle, park: &Park) -> f64 {
    let trip_to_vehicle = robot.energy_for_trip(vehicle.position, vehicle.position, false);
    let charge_need = (vehicle.required_energy - vehicle.current_energy).max(0.0);
    let estimated_charging = charge_need * 0.5;
    let nearest_station = park.nearest_station(robot.position);
    let trip_back = robot.energy_for_trip(nearest_station, nearest_station, false);
    trip_to_vehicle + estimated_charging + trip_back
}

/// The shared feasibility predicate (§4.5): can `robot` reach, charge, and
/// return for `vehicle` before it departs, with `margin` spare battery?
fn is_feasible(now: u32, robot: &Robot, vehicle: &Vehicle, park: &Park, batteries: &[Battery], margin: f64) -> bool {
    let travel_time = robot.time_to_reach(vehicle.position);
    let charge_time = vehicle.needed_charge_time();
    if now as f64 + travel_time + charge_time > vehicle.departure_minute as f64 {
        return false;
    }

    let Some(battery_id) = robot.battery else { return false };
    let current_charge = battery_charge(batteries, battery_id);
    let needed = total_energy_needed(robot, vehicle, park);
    current_charge > needed * margin
}

/// Indices of robots eligible for a new assignment: idle, carrying a battery
/// above `MIN_DISPATCH_CHARGE`.
fn eligible_robots(robots: &[Robot], batteries: &[Battery]) -> Vec<usize> {
    robots
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.status == RobotStatus::Idle
                && r.battery.is_some_and(|id| battery_charge(batteries, id) > MIN_DISPATCH_CHARGE)
        })
        .map(|(i, _)| i)
        .collect()
}

fn waiting_vehicles(vehicles: &[Vehicle]) -> Vec<usize> {
    vehicles.iter().enumerate().filter(|(_, v)| v.status == VehicleStatus::Waiting).map(|(i, _)| i).collect()
}

fn assign(robot: &mut Robot, vehicle: &mut Vehicle, now: u32) {
    robot.status = RobotStatus::MovingToVehicle;
    robot.target_vehicle = Some(vehicle.id);
    robot.last_assigned_minute = now;
    vehicle.status = VehicleStatus::Assigned;
    vehicle.assigned_robot = Some(robot.id);
}

/// A task-assignment strategy. `&self` so a stateless heuristic and a
/// learning policy with interior-mutable state share one interface.
pub trait Policy {
    fn name(&self) -> &'static str;

    fn assign_tasks(
        &self,
        now: u32,
        vehicles: &mut [Vehicle],
        robots: &mut [Robot],
        batteries: &[Battery],
        park: &Park,
        zone_coverage: &ZoneCoverage,
    );

    /// Notifies the policy that `vehicle` finished charging, for policies that
    /// learn from outcomes. No-op for the stateless heuristics.
    fn on_vehicle_completed(&self, _robot: &Robot, _vehicle: &Vehicle, _now: u32) {}

    /// Notifies the policy that `vehicle` departed without finishing.
    fn on_vehicle_failed(&self, _vehicle: &Vehicle, _now: u32) {}
}

/// Attempts the single-robot, single-vehicle emergency fast path used when a
/// vehicle arrives with less than an hour to dwell (§4.2/§4.5).
pub fn try_assign_emergency(
    vehicle_idx: usize,
    now: u32,
    vehicles: &mut [Vehicle],
    robots: &mut [Robot],
    batteries: &[Battery],
    park: &Park,
) -> bool {
    let mut candidates = eligible_robots(robots, batteries);
    candidates.sort_by(|&a, &b| {
        robots[a].distance_to(vehicles[vehicle_idx].position).total_cmp(&robots[b].distance_to(vehicles[vehicle_idx].position))
    });

    for robot_idx in candidates {
        if is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, FIXED_SAFETY_MARGIN) {
            assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            return true;
        }
    }
    false
}

/// Nearest-robot-first (§4.5): each idle robot takes the closest waiting
/// vehicle it can feasibly serve. Matches the reference's structure of not
/// removing the robot from its own working set (harmless, since the loop
/// visits each robot exactly once regardless).
pub struct NearestFirst;

impl Policy for NearestFirst {
    fn name(&self) -> &'static str {
        "nearest_first"
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
        let robot_indices = eligible_robots(robots, batteries);
        let mut waiting = waiting_vehicles(vehicles);

        for robot_idx in robot_indices {
            if waiting.is_empty() {
                break;
            }
            waiting.sort_by(|&a, &b| {
                robots[robot_idx].distance_to(vehicles[a].position).total_cmp(&robots[robot_idx].distance_to(vehicles[b].position))
            });

            if let Some(pos) = waiting.iter().position(|&vehicle_idx| {
                is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, FIXED_SAFETY_MARGIN)
            }) {
                let vehicle_idx = waiting.remove(pos);
                assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            }
        }
    }
}

/// Largest-charge-deficit-first (§4.5): vehicles are served in descending
/// order of `required_energy - current_energy`, each matched to its nearest
/// feasible robot.
pub struct MaxChargeNeedFirst;

impl Policy for MaxChargeNeedFirst {
    fn name(&self) -> &'static str {
        "max_charge_need_first"
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
        let mut waiting = waiting_vehicles(vehicles);
        waiting.sort_by(|&a, &b| {
            let need_a = vehicles[a].required_energy - vehicles[a].current_energy;
            let need_b = vehicles[b].required_energy - vehicles[b].current_energy;
            need_b.total_cmp(&need_a)
        });
        let mut robot_indices = eligible_robots(robots, batteries);

        for vehicle_idx in waiting {
            if robot_indices.is_empty() {
                break;
            }
            robot_indices.sort_by(|&a, &b| {
                robots[a].distance_to(vehicles[vehicle_idx].position).total_cmp(&robots[b].distance_to(vehicles[vehicle_idx].position))
            });

            if let Some(pos) = robot_indices.iter().position(|&robot_idx| {
                is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, FIXED_SAFETY_MARGIN)
            }) {
                let robot_idx = robot_indices.remove(pos);
                assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            }
        }
    }
}

/// Earliest-deadline-first (§4.5): vehicles are served in ascending order of
/// `departure_minute`, each matched to its nearest feasible robot.
pub struct EarliestDeadlineFirst;

impl Policy for EarliestDeadlineFirst {
    fn name(&self) -> &'static str {
        "earliest_deadline_first"
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
        let mut waiting = waiting_vehicles(vehicles);
        waiting.sort_by_key(|&i| vehicles[i].departure_minute);
        let mut robot_indices = eligible_robots(robots, batteries);

        for vehicle_idx in waiting {
            if robot_indices.is_empty() {
                break;
            }
            robot_indices.sort_by(|&a, &b| {
                robots[a].distance_to(vehicles[vehicle_idx].position).total_cmp(&robots[b].distance_to(vehicles[vehicle_idx].position))
            });

            if let Some(pos) = robot_indices.iter().position(|&robot_idx| {
                is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, FIXED_SAFETY_MARGIN)
            }) {
                let robot_idx = robot_indices.remove(pos);
                assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            }
        }
    }
}

/// Most-urgent-first (§4.5): vehicles are served in descending `priority`
/// order (§4.3's formula), each matched to its nearest feasible robot.
pub struct MostUrgentFirst;

impl Policy for MostUrgentFirst {
    fn name(&self) -> &'static str {
        "most_urgent_first"
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
        let mut waiting = waiting_vehicles(vehicles);
        waiting.sort_by(|&a, &b| vehicles[b].priority.total_cmp(&vehicles[a].priority));
        let mut robot_indices = eligible_robots(robots, batteries);

        for vehicle_idx in waiting {
            if robot_indices.is_empty() {
                break;
            }
            robot_indices.sort_by(|&a, &b| {
                robots[a].distance_to(vehicles[vehicle_idx].position).total_cmp(&robots[b].distance_to(vehicles[vehicle_idx].position))
            });

            if let Some(pos) = robot_indices.iter().position(|&robot_idx| {
                is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, FIXED_SAFETY_MARGIN)
            }) {
                let robot_idx = robot_indices.remove(pos);
                assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            }
        }
    }
}

/// Hybrid strategy (§4.5): scores every waiting vehicle on service value,
/// urgency, starvation-avoidance, and zone fairness, then greedily matches
/// battery-richest robots to their best-scoring feasible vehicle, penalizing
/// long trips and varying the safety margin with the robot's own charge.
pub struct Hybrid;

fn hybrid_score(vehicle: &Vehicle, now: u32, park: &Park, zone_coverage: &ZoneCoverage) -> f64 {
    let charge_need = (vehicle.required_energy - vehicle.current_energy).max(0.0);
    let time_left = (vehicle.departure_minute as i64 - now as i64).max(1) as f64;
    let waiting_time = (now as i64 - vehicle.arrival_minute as i64).max(0) as f64;

    let service_value = if time_left > 0.0 { charge_need / time_left } else { f64::INFINITY };
    let urgency_factor = if time_left < 60.0 { 5.0 * (60.0 / time_left) } else { 1.0 };
    let waiting_factor = (waiting_time / 60.0).min(3.0);

    let zone = park.quadrant(vehicle.position);
    let total_services = zone_coverage.total().max(1) as f64;
    let expected_ratio = 1.0 / Zone::ALL.len() as f64;
    let actual_ratio = zone_coverage.count(zone) as f64 / total_services;
    let area_balance = if actual_ratio < expected_ratio * 0.8 { 1.5 } else { 1.0 };

    service_value * urgency_factor * waiting_factor * area_balance
}

impl Policy for Hybrid {
    fn name(&self) -> &'static str {
        "hybrid_strategy"
    }

    fn assign_tasks(
        &self,
        now: u32,
        vehicles: &mut [Vehicle],
        robots: &mut [Robot],
        batteries: &[Battery],
        park: &Park,
        zone_coverage: &ZoneCoverage,
    ) {
        let mut robot_indices = eligible_robots(robots, batteries);
        robot_indices.sort_by(|&a, &b| {
            let charge_a = robots[a].battery.map(|id| battery_charge(batteries, id)).unwrap_or(0.0);
            let charge_b = robots[b].battery.map(|id| battery_charge(batteries, id)).unwrap_or(0.0);
            charge_b.total_cmp(&charge_a)
        });

        let mut scored: Vec<(usize, f64)> = waiting_vehicles(vehicles)
            .into_iter()
            .map(|i| (i, hybrid_score(&vehicles[i], now, park, zone_coverage)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        for robot_idx in robot_indices {
            if scored.is_empty() {
                break;
            }

            let robot_charge = robots[robot_idx].battery.map(|id| battery_charge(batteries, id)).unwrap_or(0.0);
            let safety_margin = (1.5 - robot_charge / 60.0).clamp(1.2, 1.5);

            let mut best: Option<(usize, f64)> = None;
            for (rank, &(vehicle_idx, base_score)) in scored.iter().enumerate() {
                if !is_feasible(now, &robots[robot_idx], &vehicles[vehicle_idx], park, batteries, safety_margin) {
                    continue;
                }
                let distance = robots[robot_idx].distance_to(vehicles[vehicle_idx].position);
                let distance_penalty = 1.0 - (distance / 1000.0).min(0.4);
                let match_score = base_score * distance_penalty;

                if best.is_none_or(|(_, best_score)| match_score > best_score) {
                    best = Some((rank, match_score));
                }
            }

            if let Some((rank, _)) = best {
                let (vehicle_idx, _) = scored.remove(rank);
                assign(&mut robots[robot_idx], &mut vehicles[vehicle_idx], now);
            }
        }
    }
}

/// Resolves a policy by its configuration name (§6).
pub fn policy_by_name(name: &str) -> Option<Box<dyn Policy>> {
    match name {
        "nearest_first" => Some(Box::new(NearestFirst)),
        "max_charge_need_first" => Some(Box::new(MaxChargeNeedFirst)),
        "earliest_deadline_first" => Some(Box::new(EarliestDeadlineFirst)),
        "most_urgent_first" => Some(Box::new(MostUrgentFirst)),
        "hybrid_strategy" => Some(Box::new(Hybrid)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;

    fn make_robot(id: RobotId, pos: Point, battery_id: BatteryId) -> Robot {
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
    fn nearest_first_picks_closest_feasible_vehicle() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![
            Vehicle::new(0, 0, Point::new(500.0, 500.0), 50.0, 500, 60.0),
            Vehicle::new(1, 0, Point::new(10.0, 10.0), 50.0, 500, 60.0),
        ];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        NearestFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(robots[0].target_vehicle, Some(1));
        assert_eq!(vehicles[1].status, VehicleStatus::Assigned);
        assert_eq!(vehicles[0].status, VehicleStatus::Waiting);
    }

    #[test]
    fn infeasible_deadline_leaves_vehicle_waiting() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(900.0, 900.0), 10.0, 2, 90.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        NearestFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(vehicles[0].status, VehicleStatus::Waiting);
    }

    #[test]
    fn low_battery_robot_is_not_eligible() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(10.0, 10.0), 50.0, 500, 60.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 10.0)];
        let coverage = ZoneCoverage::new();

        NearestFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(vehicles[0].status, VehicleStatus::Waiting);
    }

    #[test]
    fn max_charge_need_first_serves_largest_deficit() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![
            Vehicle::new(0, 0, Point::new(100.0, 100.0), 90.0, 500, 95.0),
            Vehicle::new(1, 0, Point::new(100.0, 100.0), 10.0, 500, 95.0),
        ];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        MaxChargeNeedFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(robots[0].target_vehicle, Some(1));
    }

    #[test]
    fn earliest_deadline_first_serves_soonest_departure() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![
            Vehicle::new(0, 0, Point::new(100.0, 100.0), 50.0, 500, 60.0),
            Vehicle::new(1, 0, Point::new(100.0, 100.0), 50.0, 200, 60.0),
        ];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        EarliestDeadlineFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(robots[0].target_vehicle, Some(1));
    }

    #[test]
    fn most_urgent_first_serves_highest_priority() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![
            Vehicle::new(0, 0, Point::new(100.0, 100.0), 90.0, 500, 95.0),
            Vehicle::new(1, 0, Point::new(100.0, 100.0), 10.0, 500, 95.0),
        ];
        vehicles[0].update_priority(0);
        vehicles[1].update_priority(0);
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];
        let coverage = ZoneCoverage::new();

        MostUrgentFirst.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(robots[0].target_vehicle, Some(1));
    }

    #[test]
    fn hybrid_skips_vehicle_when_no_robot_has_enough_margin() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(999.0, 999.0), 5.0, 40, 95.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 20.0)];
        let coverage = ZoneCoverage::new();

        Hybrid.assign_tasks(0, &mut vehicles, &mut robots, &batteries, &park, &coverage);

        assert_eq!(vehicles[0].status, VehicleStatus::Waiting);
    }

    #[test]
    fn emergency_assignment_bypasses_periodic_cache() {
        let park = Park::with_default_stations(1000.0, 1000.0);
        let mut vehicles = vec![Vehicle::new(0, 0, Point::new(10.0, 10.0), 50.0, 50, 60.0)];
        let mut robots = vec![make_robot(0, Point::new(0.0, 0.0), 0)];
        let batteries = vec![make_battery(0, 60.0)];

        let assigned = try_assign_emergency(0, 0, &mut vehicles, &mut robots, &batteries, &park);

        assert!(assigned);
        assert_eq!(vehicles[0].status, VehicleStatus::Assigned);
    }

    #[test]
    fn policy_by_name_resolves_all_five() {
        for name in [
            "nearest_first",
            "max_charge_need_first",
            "earliest_deadline_first",
            "most_urgent_first",
            "hybrid_strategy",
        ] {
            assert!(policy_by_name(name).is_some());
        }
        assert!(policy_by_name("unknown").is_none());
    }
}
