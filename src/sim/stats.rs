//! Aggregate run statistics (§4.9), computed post-hoc from final entity state.
//!
//! Grounded on `sim/kpi.rs`'s `KpiReport::from_results`: the same empty-guard
//! and `Display` report shape, adapted from feeder-tracking metrics to fleet
//! dispatch metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Zone;
use crate::sim::entities::{Robot, RobotStatus, Vehicle, VehicleStatus};

/// Aggregate key performance indicators for a complete simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub completed_count: usize,
    pub failed_count: usize,
    pub completion_rate: f64,
    pub avg_waiting_time: f64,
    pub avg_charging_time: f64,
    pub battery_swaps: u32,
    pub robot_utilization: Vec<f64>,
    pub avg_robot_utilization: f64,
    pub zone_coverage: Vec<(Zone, u32)>,
}

impl Stats {
    /// Computes every field from the vehicles' and robots' final state plus
    /// the horizon length, per §4.9. `battery_swaps` and `zone_coverage` are
    /// running counters maintained by the kernel and folded in here.
    pub fn finalize(
        vehicles: &[Vehicle],
        robots: &[Robot],
        horizon: u32,
        battery_swaps: u32,
        zone_coverage: &crate::sim::dispatch::ZoneCoverage,
    ) -> Self {
        let completed: Vec<&Vehicle> = vehicles.iter().filter(|v| v.status == VehicleStatus::Completed).collect();
        let failed_count = vehicles.iter().filter(|v| v.status == VehicleStatus::Failed).count();
        let completed_count = completed.len();

        let total = completed_count + failed_count;
        let completion_rate = if total > 0 { 100.0 * completed_count as f64 / total as f64 } else { 0.0 };

        let (avg_waiting_time, avg_charging_time) = if completed_count > 0 {
            let mut total_wait = 0.0;
            let mut total_charge = 0.0;
            for v in &completed {
                let start = v.charging_start_minute.unwrap_or(v.arrival_minute);
                let end = v.charging_end_minute.unwrap_or(start);
                total_wait += (start as i64 - v.arrival_minute as i64).max(0) as f64;
                total_charge += (end as i64 - start as i64).max(0) as f64;
            }
            (total_wait / completed_count as f64, total_charge / completed_count as f64)
        } else {
            (0.0, 0.0)
        };

        let robot_utilization: Vec<f64> = if horizon > 0 {
            robots.iter().map(|r| r.busy_minutes as f64 / horizon as f64 * 100.0).collect()
        } else {
            vec![0.0; robots.len()]
        };
        let avg_robot_utilization = if !robot_utilization.is_empty() {
            robot_utilization.iter().sum::<f64>() / robot_utilization.len() as f64
        } else {
            0.0
        };

        let zones = Zone::ALL.iter().map(|&z| (z, zone_coverage.count(z))).collect();

        Self {
            completed_count,
            failed_count,
            completion_rate,
            avg_waiting_time,
            avg_charging_time,
            battery_swaps,
            robot_utilization,
            avg_robot_utilization,
            zone_coverage: zones,
        }
    }

    /// Counts robots currently mid-task, a convenience for live snapshots.
    pub fn busy_robot_count(robots: &[Robot]) -> usize {
        robots.iter().filter(|r| matches!(r.status, RobotStatus::MovingToVehicle | RobotStatus::ChargingVehicle)).count()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Fleet Charging Report ---")?;
        writeln!(f, "Completed:             {}", self.completed_count)?;
        writeln!(f, "Failed:                {}", self.failed_count)?;
        writeln!(f, "Completion rate:       {:.1}%", self.completion_rate)?;
        writeln!(f, "Avg waiting time:      {:.1} min", self.avg_waiting_time)?;
        writeln!(f, "Avg charging time:     {:.1} min", self.avg_charging_time)?;
        writeln!(f, "Battery swaps:         {}", self.battery_swaps)?;
        writeln!(f, "Avg robot utilization: {:.1}%", self.avg_robot_utilization)?;
        write!(f, "Zone coverage:         {:?}", self.zone_coverage)
    }
}
