//! Request handlers for the snapshot API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::AppState;
use super::types::{EntitySnapshot, StateResponse};
use crate::sim::entities::{Battery, Robot, Vehicle};

/// `GET /state` → 200 + `StateResponse` JSON (current time, scenario config,
/// and stats).
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        current_time: state.snapshot.current_time,
        scenario: state.snapshot.scenario.clone(),
        stats: state.snapshot.stats.clone(),
    })
}

/// `GET /snapshot` → 200 + the full entity snapshot (every vehicle, robot,
/// and battery) in one response.
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<EntitySnapshot> {
    Json(EntitySnapshot {
        current_time: state.snapshot.current_time,
        vehicles: state.snapshot.vehicles.clone(),
        robots: state.snapshot.robots.clone(),
        batteries: state.snapshot.batteries.clone(),
    })
}

/// `GET /vehicles` → 200 + every vehicle's snapshot.
pub async fn get_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<Vehicle>> {
    Json(state.snapshot.vehicles.clone())
}

/// `GET /robots` → 200 + every robot's snapshot.
pub async fn get_robots(State(state): State<Arc<AppState>>) -> Json<Vec<Robot>> {
    Json(state.snapshot.robots.clone())
}

/// `GET /batteries` → 200 + every battery's snapshot.
pub async fn get_batteries(State(state): State<Arc<AppState>>) -> Json<Vec<Battery>> {
    Json(state.snapshot.batteries.clone())
}
