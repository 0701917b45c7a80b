//! The simulation kernel (§4.1, §4.4, §4.6, §4.7, §6): owns the event queue
//! and every entity collection, and drives the per-tick state machine.
//!
//! A single struct owns every moving part and exposes a `step`/`run` pair,
//! with `setup`, `handle_vehicle_arrival`, `handle_vehicle_departure`,
//! `update_status`, and `update_priorities` as its internal phases.

use std::fmt;
use std::rc::Rc;

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ConfigError, ScaleParams, ScenarioConfig};
use crate::geo::Park;
use crate::sim::arrivals;
use crate::sim::dispatch::{self, Policy, ZoneCoverage};
use crate::sim::entities::{
    Battery, BatteryId, BatteryStatus, DEFAULT_BATTERY_CAPACITY, Robot, RobotId, RobotStatus, Vehicle, VehicleId,
    VehicleStatus, VEHICLE_MAX_ENERGY,
};
use crate::sim::event::{EventKind, EventPayload, EventQueue, repost_period};
use crate::sim::rl::{EpisodeLog, RlPolicy};
use crate::sim::stats::Stats;

/// XORed into the configured seed to give the RL policy's exploration RNG a
/// stream independent of the kernel's own arrival/efficiency RNG.
const RL_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Fatal conditions the kernel can raise while stepping (§7). Modeled
/// failures, starvation, and infeasible assignments are *not* represented
/// here — they're ordinary state transitions.
#[derive(Debug, Clone)]
pub enum SimulatorError {
    /// `ScenarioConfig::validate()` (or a policy/scale name it implies)
    /// reported one or more problems; the run never started.
    InvalidConfiguration(Vec<ConfigError>),
    /// A physical invariant was violated mid-run — a bug, not a modeled
    /// outcome.
    InvariantViolation { entity: &'static str, id: u32, detail: String },
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::InvalidConfiguration(errors) => {
                writeln!(f, "invalid configuration:")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "  {e}")?;
                }
                Ok(())
            }
            SimulatorError::InvariantViolation { entity, id, detail } => {
                write!(f, "invariant violation: {entity} #{id}: {detail}")
            }
        }
    }
}

impl From<ConfigError> for SimulatorError {
    fn from(e: ConfigError) -> Self {
        SimulatorError::InvalidConfiguration(vec![e])
    }
}

/// Resolves a configured policy name to a live policy instance. `"rl"` gets
/// its own seeded `RlPolicy`; every other name goes through
/// `dispatch::policy_by_name`.
fn policy_for(name: &str, seed: u64) -> Result<Rc<dyn Policy>, SimulatorError> {
    if name == "rl" {
        return Ok(Rc::new(RlPolicy::new(StdRng::seed_from_u64(seed ^ RL_SEED_SALT))));
    }
    dispatch::policy_by_name(name).map(Rc::from).ok_or_else(|| {
        ConfigError { field: "policy".into(), message: format!("unknown policy \"{name}\"") }.into()
    })
}

/// Owns the event queue, every entity collection, and the active dispatch
/// policy; drives the simulation one event at a time.
pub struct Simulator {
    park: Park,
    scale: ScaleParams,
    horizon: u32,
    clock: u32,
    rng: StdRng,
    queue: EventQueue,
    vehicles: Vec<Vehicle>,
    robots: Vec<Robot>,
    batteries: Vec<Battery>,
    policy: Rc<dyn Policy>,
    zone_coverage: ZoneCoverage,
    battery_swaps: u32,
    last_assignment_time: Option<u32>,
    last_waiting_ids: Vec<VehicleId>,
    /// Mirrors the reference's `self.log(...)` calls: one line to stderr per
    /// arrival, assignment, completion, failure, or battery swap.
    verbose: bool,
}

impl Simulator {
    /// Builds a simulator from a scenario configuration, resolving its scale
    /// and policy name and rejecting the run outright if either is invalid.
    pub fn new(config: &ScenarioConfig) -> Result<Self, SimulatorError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(SimulatorError::InvalidConfiguration(errors));
        }
        let scale = config.scale.resolve()?;
        let policy = policy_for(&config.policy, config.seed)?;
        let mut sim =
            Self::with_policy(config.park.to_park(), scale, config.horizon_minutes, config.seed, policy);
        sim.verbose = config.verbose;
        Ok(sim)
    }

    fn with_policy(park: Park, scale: ScaleParams, horizon: u32, seed: u64, policy: Rc<dyn Policy>) -> Self {
        Self {
            park,
            scale,
            horizon,
            clock: 0,
            rng: StdRng::seed_from_u64(seed),
            queue: EventQueue::new(),
            vehicles: Vec::new(),
            robots: Vec::new(),
            batteries: Vec::new(),
            policy,
            zone_coverage: ZoneCoverage::new(),
            battery_swaps: 0,
            last_assignment_time: None,
            last_waiting_ids: Vec::new(),
            verbose: false,
        }
    }

    /// Emits `message` to stderr, prefixed with the current clock, when
    /// verbose logging is enabled.
    fn log(&self, message: fmt::Arguments) {
        if self.verbose {
            eprintln!("{:>6}min: {}", self.clock, message);
        }
    }

    /// Creates the robot and battery fleets, assigns initial batteries,
    /// generates every arrival, and seeds the event queue (§6).
    pub fn setup(&mut self) {
        let robots_count = self.scale.robots_count;
        let batteries_count = self.scale.batteries_count;

        for i in 0..robots_count {
            let home = self.park.stations[self.rng.random_range(0..self.park.stations.len())];
            self.robots.push(Robot::new(i as RobotId, home));
        }
        for i in 0..batteries_count {
            let station = self.park.stations[i % self.park.stations.len()];
            self.batteries.push(Battery::new(i as BatteryId, DEFAULT_BATTERY_CAPACITY, station));
        }
        for i in 0..robots_count.min(batteries_count) {
            self.robots[i].battery = Some(self.batteries[i].id);
            self.batteries[i].status = BatteryStatus::InUse;
            self.batteries[i].assigned_robot = Some(self.robots[i].id);
            self.batteries[i].location = self.robots[i].position;
        }

        self.vehicles = arrivals::generate_arrivals(&self.park, self.horizon, self.scale.vehicles_per_hour, &mut self.rng);
        for v in &self.vehicles {
            self.queue.push(v.arrival_minute, EventKind::VehicleArrival, EventPayload::Vehicle(v.id));
        }

        self.queue.push(0, EventKind::AssignTasks, EventPayload::None);
        self.queue.push(1, EventKind::UpdateStatus, EventPayload::None);
        self.queue.push(1, EventKind::UpdatePriorities, EventPayload::None);
    }

    /// Drains the event queue until it empties or the clock reaches the
    /// horizon, then returns the final statistics.
    pub fn run(&mut self) -> Result<Stats, SimulatorError> {
        while self.step()? {}
        Ok(self.stats())
    }

    /// Advances the simulation by exactly one event, for interactive
    /// embedding (§6). Returns `Ok(false)` once the run has terminated.
    ///
    /// Checks the *next* event's own timestamp against the horizon, not the
    /// clock left over from the previous pop, so every event timestamped at
    /// exactly the horizon is still drained before the run stops — including
    /// a same-minute `VehicleDeparture` queued behind an `UpdateStatus` tick.
    pub fn step(&mut self) -> Result<bool, SimulatorError> {
        match self.queue.peek() {
            Some(event) if event.time <= self.horizon => {}
            _ => return Ok(false),
        }
        let event = self.queue.pop().expect("peeked non-empty above");
        self.clock = event.time;
        self.handle_event(event)?;
        if let Some(period) = repost_period(event.kind) {
            self.queue.push(event.time + period, event.kind, event.payload);
        }
        Ok(true)
    }

    fn handle_event(&mut self, event: crate::sim::event::Event) -> Result<(), SimulatorError> {
        match event.kind {
            EventKind::VehicleArrival => {
                if let EventPayload::Vehicle(id) = event.payload {
                    self.handle_vehicle_arrival(id);
                }
            }
            EventKind::VehicleDeparture => {
                if let EventPayload::Vehicle(id) = event.payload {
                    self.handle_vehicle_departure(id);
                }
            }
            EventKind::UpdateStatus => self.update_status()?,
            EventKind::UpdatePriorities => self.update_priorities(),
            EventKind::AssignTasks => self.assign_tasks(),
            // Conceptual kinds only: task completion and battery-charged
            // transitions are invoked synchronously from `update_status`,
            // never queued, matching the reference's direct method calls.
            EventKind::TaskCompletion | EventKind::BatteryCharged => {}
        }
        Ok(())
    }

    /// §4.2's emergency fast path plus priority bookkeeping on arrival.
    fn handle_vehicle_arrival(&mut self, vehicle_id: VehicleId) {
        let now = self.clock;
        let idx = vehicle_id as usize;
        self.vehicles[idx].update_priority(now);
        self.queue.push(self.vehicles[idx].departure_minute, EventKind::VehicleDeparture, EventPayload::Vehicle(vehicle_id));
        self.log(format_args!(
            "vehicle {} arrives at ({:.0}, {:.0}), needs {:.1}kWh by minute {}",
            vehicle_id, self.vehicles[idx].position.x, self.vehicles[idx].position.y,
            self.vehicles[idx].required_energy, self.vehicles[idx].departure_minute
        ));

        let dwell_left = self.vehicles[idx].departure_minute as i64 - now as i64;
        if dwell_left < 60 {
            let assigned =
                dispatch::try_assign_emergency(idx, now, &mut self.vehicles, &mut self.robots, &self.batteries, &self.park);
            if assigned {
                let zone = self.park.quadrant(self.vehicles[idx].position);
                self.zone_coverage.record(zone);
                let robot_id = self.vehicles[idx].assigned_robot.expect("emergency assignment just set this");
                self.log(format_args!(
                    "[emergency] robot {robot_id} assigned to vehicle {vehicle_id} (dwell {dwell_left} min left)"
                ));
            }
        }
    }

    /// §4.7: a vehicle that hasn't completed by its departure minute fails.
    fn handle_vehicle_departure(&mut self, vehicle_id: VehicleId) {
        let idx = vehicle_id as usize;
        if self.vehicles[idx].status == VehicleStatus::Completed {
            return;
        }
        self.vehicles[idx].status = VehicleStatus::Failed;
        self.log(format_args!("vehicle {vehicle_id} departs unserved, marked failed"));
        if let Some(robot_id) = self.vehicles[idx].assigned_robot {
            let ridx = robot_id as usize;
            if self.robots[ridx].target_vehicle == Some(vehicle_id) {
                self.robots[ridx].target_vehicle = None;
                self.robots[ridx].status = RobotStatus::Returning;
            }
        }
        self.vehicles[idx].assigned_robot = None;
        self.policy.on_vehicle_failed(&self.vehicles[idx], self.clock);
    }

    fn update_priorities(&mut self) {
        let now = self.clock;
        for v in self.vehicles.iter_mut().filter(|v| v.status == VehicleStatus::Waiting) {
            v.update_priority(now);
        }
    }

    /// §4.5's fresh-cache guard plus zone-coverage bookkeeping around the
    /// policy's own assignment pass.
    fn assign_tasks(&mut self) {
        let now = self.clock;
        let waiting_ids: Vec<VehicleId> =
            self.vehicles.iter().filter(|v| v.status == VehicleStatus::Waiting).map(|v| v.id).collect();

        if let Some(last) = self.last_assignment_time {
            if now.saturating_sub(last) < 2 && waiting_ids == self.last_waiting_ids {
                return;
            }
        }

        self.policy.assign_tasks(now, &mut self.vehicles, &mut self.robots, &self.batteries, &self.park, &self.zone_coverage);

        for &id in &waiting_ids {
            let idx = id as usize;
            if self.vehicles[idx].status == VehicleStatus::Assigned {
                let zone = self.park.quadrant(self.vehicles[idx].position);
                self.zone_coverage.record(zone);
            }
        }

        self.last_assignment_time = Some(now);
        self.last_waiting_ids = self.vehicles.iter().filter(|v| v.status == VehicleStatus::Waiting).map(|v| v.id).collect();
    }

    /// The per-tick state updater (§4.4): robots in ascending id order, then
    /// charging batteries.
    fn update_status(&mut self) -> Result<(), SimulatorError> {
        let now = self.clock;

        for ridx in 0..self.robots.len() {
            let Some(battery_id) = self.robots[ridx].battery else {
                self.try_pick_up_battery(ridx);
                continue;
            };
            let bidx = battery_id as usize;

            if self.batteries[bidx].current_charge < 10.0 {
                self.handle_low_battery(ridx, bidx, now);
                continue;
            }

            match self.robots[ridx].status {
                RobotStatus::Idle => {
                    self.batteries[bidx].current_charge -= self.robots[ridx].idling_energy_rate;
                }
                RobotStatus::MovingToVehicle => self.advance_moving_robot(ridx, bidx, now),
                RobotStatus::ChargingVehicle => self.advance_charging_robot(ridx, bidx, now)?,
                RobotStatus::Returning => self.advance_returning_robot(ridx),
                RobotStatus::SwappingBattery => self.robots[ridx].status = RobotStatus::Idle,
            }
        }

        for battery in self.batteries.iter_mut() {
            if battery.status == BatteryStatus::Charging && self.park.is_at_station(battery.location) {
                let rate = battery.recharge_rate();
                battery.current_charge = (battery.current_charge + rate).min(battery.max_capacity);
                if battery.is_full_enough() {
                    battery.status = BatteryStatus::Available;
                    battery.charge_start_minute = None;
                }
            }
        }

        Ok(())
    }

    fn try_pick_up_battery(&mut self, ridx: usize) {
        let pos = self.robots[ridx].position;
        let Some(bidx) = self.batteries.iter().position(|b| b.status == BatteryStatus::Available && b.location == pos) else {
            return;
        };
        self.robots[ridx].battery = Some(self.batteries[bidx].id);
        self.batteries[bidx].status = BatteryStatus::InUse;
        self.batteries[bidx].assigned_robot = Some(self.robots[ridx].id);
    }

    fn handle_low_battery(&mut self, ridx: usize, bidx: usize, now: u32) {
        let position = self.robots[ridx].position;
        if self.park.is_at_station(position) {
            self.batteries[bidx].status = BatteryStatus::Charging;
            self.batteries[bidx].assigned_robot = None;
            self.batteries[bidx].location = position;
            self.batteries[bidx].charge_start_minute = Some(now);
            self.robots[ridx].battery = None;

            let replacement = self
                .batteries
                .iter()
                .position(|b| b.status == BatteryStatus::Available && b.location == position && b.current_charge > 45.0);
            match replacement {
                Some(ridx2) => {
                    let robot_id = self.robots[ridx].id;
                    let old_battery = self.batteries[bidx].id;
                    let new_battery = self.batteries[ridx2].id;
                    self.robots[ridx].battery = Some(self.batteries[ridx2].id);
                    self.batteries[ridx2].status = BatteryStatus::InUse;
                    self.batteries[ridx2].assigned_robot = Some(self.robots[ridx].id);
                    self.battery_swaps += 1;
                    self.log(format_args!("robot {robot_id} swaps battery {old_battery} for {new_battery}"));
                }
                None => self.robots[ridx].status = RobotStatus::Idle,
            }
        } else {
            let nearest = self.park.nearest_station(position);
            self.robots[ridx].position = position.step_towards(nearest, self.robots[ridx].speed);
            self.robots[ridx].status = RobotStatus::Returning;
            self.robots[ridx].target_vehicle = None;
        }
    }

    fn advance_moving_robot(&mut self, ridx: usize, bidx: usize, now: u32) {
        self.robots[ridx].busy_minutes += 1;
        let target_idx = self.robots[ridx].target_vehicle.map(|id| id as usize);
        let target_done =
            target_idx.is_none_or(|i| matches!(self.vehicles[i].status, VehicleStatus::Completed | VehicleStatus::Failed));

        if target_done {
            self.robots[ridx].status = RobotStatus::Returning;
            self.robots[ridx].target_vehicle = None;
            return;
        }

        let tidx = target_idx.expect("target_done already handled the None case");
        let target_pos = self.vehicles[tidx].position;
        let new_pos = self.robots[ridx].position.step_towards(target_pos, self.robots[ridx].speed);
        self.robots[ridx].position = new_pos;
        self.batteries[bidx].current_charge -= self.robots[ridx].moving_energy_rate;

        if new_pos == target_pos {
            self.robots[ridx].status = RobotStatus::ChargingVehicle;
            self.vehicles[tidx].status = VehicleStatus::Charging;
            self.vehicles[tidx].charging_start_minute = Some(now);
        }
    }

    fn advance_charging_robot(&mut self, ridx: usize, bidx: usize, now: u32) -> Result<(), SimulatorError> {
        self.robots[ridx].busy_minutes += 1;
        let Some(target_id) = self.robots[ridx].target_vehicle else { return Ok(()) };
        let tidx = target_id as usize;

        if self.batteries[bidx].current_charge < 8.0 {
            self.vehicles[tidx].status = VehicleStatus::Waiting;
            self.vehicles[tidx].assigned_robot = None;
            self.robots[ridx].status = RobotStatus::Returning;
            self.robots[ridx].target_vehicle = None;
            return Ok(());
        }

        let charge_rate = self.vehicles[tidx].charge_rate();
        let max_transfer = charge_rate.min(self.batteries[bidx].current_charge - 8.0);
        if max_transfer <= 0.0 {
            self.vehicles[tidx].status = VehicleStatus::Waiting;
            self.vehicles[tidx].assigned_robot = None;
            self.robots[ridx].status = RobotStatus::Returning;
            self.robots[ridx].target_vehicle = None;
            return Ok(());
        }

        let efficiency = self.rng.random_range(0.95..=1.05);
        let actual_transfer = max_transfer * efficiency;
        self.vehicles[tidx].current_energy = (self.vehicles[tidx].current_energy + actual_transfer).min(VEHICLE_MAX_ENERGY);
        self.batteries[bidx].current_charge -= max_transfer;

        if self.batteries[bidx].current_charge < -1e-6 {
            return Err(SimulatorError::InvariantViolation {
                entity: "battery",
                id: self.batteries[bidx].id,
                detail: "charge went negative during transfer".into(),
            });
        }

        if self.vehicles[tidx].current_energy >= self.vehicles[tidx].required_energy {
            self.finalize_task(ridx, now);
        }
        Ok(())
    }

    fn advance_returning_robot(&mut self, ridx: usize) {
        let position = self.robots[ridx].position;
        let nearest = self.park.nearest_station(position);
        let new_pos = position.step_towards(nearest, self.robots[ridx].speed);
        self.robots[ridx].position = new_pos;
        if new_pos == nearest {
            self.robots[ridx].status = RobotStatus::Idle;
        }
    }

    /// §4.6: marks the robot's target vehicle completed and releases the
    /// robot, forcing a retreat to the nearest station if its battery is
    /// nearly spent.
    fn finalize_task(&mut self, ridx: usize, now: u32) {
        let Some(vehicle_id) = self.robots[ridx].target_vehicle else { return };
        let vidx = vehicle_id as usize;

        self.vehicles[vidx].status = VehicleStatus::Completed;
        self.vehicles[vidx].charging_end_minute = Some(now);
        self.vehicles[vidx].assigned_robot = None;
        self.robots[ridx].status = RobotStatus::Returning;
        self.robots[ridx].target_vehicle = None;
        self.log(format_args!(
            "robot {} finishes charging vehicle {} to {:.1}kWh",
            self.robots[ridx].id, vehicle_id, self.vehicles[vidx].current_energy
        ));
        self.policy.on_vehicle_completed(&self.robots[ridx], &self.vehicles[vidx], now);

        if let Some(battery_id) = self.robots[ridx].battery {
            let bidx = battery_id as usize;
            if self.batteries[bidx].current_charge < 10.0 {
                self.robots[ridx].position = self.park.nearest_station(self.robots[ridx].position);
            }
        }
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn batteries(&self) -> &[Battery] {
        &self.batteries
    }

    pub fn current_time(&self) -> u32 {
        self.clock
    }

    pub fn park(&self) -> &Park {
        &self.park
    }

    /// A live snapshot of §4.9's statistics, valid at any point in the run
    /// (not just at termination).
    pub fn stats(&self) -> Stats {
        Stats::finalize(&self.vehicles, &self.robots, self.horizon, self.battery_swaps, &self.zone_coverage)
    }
}

/// Runs `episodes` full simulator runs back-to-back against one shared
/// `RlPolicy`, reusing and evolving its Q-table and ε across runs (§4.8.1).
pub fn run_episodes(config: &ScenarioConfig, episodes: u32) -> Result<(Rc<RlPolicy>, Vec<EpisodeLog>), SimulatorError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(SimulatorError::InvalidConfiguration(errors));
    }
    let scale = config.scale.resolve()?;
    let rl = Rc::new(RlPolicy::new(StdRng::seed_from_u64(config.seed ^ RL_SEED_SALT)));

    let mut logs = Vec::with_capacity(episodes as usize);
    for _ in 0..episodes {
        let mut sim = Simulator::with_policy(config.park.to_park(), scale, config.horizon_minutes, config.seed, rl.clone());
        sim.setup();
        rl.begin_episode();
        sim.run()?;
        logs.push(rl.finish_episode());
    }
    Ok((rl, logs))
}
