//! REST snapshot API for the interactive viewer (§6).
//!
//! Exposes read-only views of simulator state taken after a run completes.
//! Provides five GET endpoints:
//! - `/state` — current time, the scenario config used, and the aggregate stats report
//! - `/snapshot` — the full entity snapshot (vehicles, robots, batteries together)
//! - `/vehicles` — every vehicle's final snapshot
//! - `/robots` — every robot's final snapshot
//! - `/batteries` — every battery's final snapshot
//!
//! `AppState` is wrapped in `Arc`, the router is GET-only, and `serve` binds a
//! `TcpListener` directly. The viewer reads these snapshots between ticks
//! rather than driving the live `Simulator` directly (§5): `Simulator` is not
//! `Send` (its policy is held behind an `Rc`), so only an owned, plain-data
//! snapshot crosses into the async server state.

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

pub use types::Snapshot;

/// Immutable application state shared across all request handlers.
///
/// Built once from a [`Snapshot`] and wrapped in `Arc` — no locks needed since
/// all data is read-only.
pub struct AppState {
    pub snapshot: Snapshot,
}

/// Builds the axum router with all snapshot routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/vehicles", get(handlers::get_vehicles))
        .route("/robots", get(handlers::get_robots))
        .route("/batteries", get(handlers::get_batteries))
        .with_state(state)
}

/// Binds to the given address and serves the snapshot API.
///
/// # Panics
///
/// Panics if the TCP listener cannot bind to `addr`.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {addr}: {e}"));
    eprintln!("snapshot API listening on http://{addr}");
    axum::serve(listener, app).await.unwrap_or_else(|e| panic!("server error: {e}"));
}
