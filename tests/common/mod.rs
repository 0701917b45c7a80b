//! Shared test fixtures for integration tests.

use charging_robots_sim::config::ScenarioConfig;

/// A small scenario scaled down to a short horizon, for tests that need a
/// fast, fully-deterministic end-to-end run.
pub fn small_scenario(seed: u64, horizon_minutes: u32) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::small();
    cfg.seed = seed;
    cfg.horizon_minutes = horizon_minutes;
    cfg
}

/// A scenario built from a named policy on top of [`small_scenario`].
pub fn scenario_with_policy(policy: &str, seed: u64, horizon_minutes: u32) -> ScenarioConfig {
    let mut cfg = small_scenario(seed, horizon_minutes);
    cfg.policy = policy.to_string();
    cfg
}
