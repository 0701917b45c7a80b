//! Snapshot types served by the API.

use serde::Serialize;

use crate::config::ScenarioConfig;
use crate::sim::entities::{Battery, Robot, Vehicle};
use crate::sim::stats::Stats;

/// A read-only copy of simulator state (§6's snapshot getters), taken at one
/// instant and handed to the API server or a CSV exporter. Plain owned data,
/// so it can cross into the `Send + Sync` world the async server requires even
/// though the live `Simulator` cannot (§5).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub current_time: u32,
    pub scenario: ScenarioConfig,
    pub vehicles: Vec<Vehicle>,
    pub robots: Vec<Robot>,
    pub batteries: Vec<Battery>,
    pub stats: Stats,
}

/// The `/state` response: current time, the scenario config in effect, and
/// the aggregate stats report.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub current_time: u32,
    pub scenario: ScenarioConfig,
    pub stats: Stats,
}

/// The `/snapshot` response: the full read-only entity snapshot (§6) — every
/// vehicle, robot, and battery's externally visible fields.
#[derive(Debug, Serialize)]
pub struct EntitySnapshot {
    pub current_time: u32,
    pub vehicles: Vec<Vehicle>,
    pub robots: Vec<Robot>,
    pub batteries: Vec<Battery>,
}
