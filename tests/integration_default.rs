//! Black-box integration tests against the public `Simulator` API (§6, §8):
//! full runs across every scale preset and dispatch policy, determinism, and
//! the horizon-truncation scenario.

mod common;

use charging_robots_sim::config::ScenarioConfig;
use charging_robots_sim::sim::entities::VehicleStatus;
use charging_robots_sim::sim::kernel::Simulator;

#[test]
fn every_policy_completes_a_full_run_without_panicking() {
    for policy in [
        "nearest_first",
        "max_charge_need_first",
        "earliest_deadline_first",
        "most_urgent_first",
        "hybrid_strategy",
        "rl",
    ] {
        let cfg = common::scenario_with_policy(policy, 7, 600);
        let mut sim = Simulator::new(&cfg).unwrap_or_else(|e| panic!("policy {policy}: {e}"));
        sim.setup();
        let stats = sim.run().unwrap_or_else(|e| panic!("policy {policy} run failed: {e}"));
        assert!((0.0..=100.0).contains(&stats.completion_rate), "policy {policy}: bad completion rate");
    }
}

#[test]
fn every_scale_preset_completes_a_full_run() {
    for preset in ScenarioConfig::PRESETS {
        let mut cfg = ScenarioConfig::from_preset(preset).unwrap();
        cfg.horizon_minutes = 300;
        let mut sim = Simulator::new(&cfg).unwrap();
        sim.setup();
        let stats = sim.run().unwrap();
        assert!(stats.completed_count + stats.failed_count <= sim.vehicles().len());
    }
}

#[test]
fn determinism_same_seed_and_config_yields_bit_identical_stats() {
    let cfg = common::small_scenario(123, 1200);

    let mut a = Simulator::new(&cfg).unwrap();
    a.setup();
    let stats_a = a.run().unwrap();

    let mut b = Simulator::new(&cfg).unwrap();
    b.setup();
    let stats_b = b.run().unwrap();

    assert_eq!(stats_a.completed_count, stats_b.completed_count);
    assert_eq!(stats_a.failed_count, stats_b.failed_count);
    assert_eq!(stats_a.battery_swaps, stats_b.battery_swaps);
    assert_eq!(stats_a.completion_rate, stats_b.completion_rate);
    assert_eq!(stats_a.avg_waiting_time, stats_b.avg_waiting_time);
    assert_eq!(stats_a.avg_charging_time, stats_b.avg_charging_time);
    for (ua, ub) in stats_a.robot_utilization.iter().zip(&stats_b.robot_utilization) {
        assert_eq!(ua, ub);
    }
}

#[test]
fn different_seeds_usually_produce_different_arrival_counts() {
    let cfg_a = common::small_scenario(1, 1200);
    let cfg_b = common::small_scenario(2, 1200);

    let mut a = Simulator::new(&cfg_a).unwrap();
    a.setup();
    let mut b = Simulator::new(&cfg_b).unwrap();
    b.setup();

    // Sanity check that the seed actually reaches the arrival generator
    // instead of being silently ignored.
    assert_ne!(a.vehicles().len(), b.vehicles().len());
}

/// Scenario 6 (§8): with a truncated horizon, every vehicle whose departure
/// falls at or before the horizon gets its departure event processed and is
/// resolved (completed or failed) by the end of the run; only vehicles
/// departing strictly after the horizon may still be in flight.
#[test]
fn horizon_truncation_resolves_every_vehicle_departing_within_horizon() {
    let cfg = common::small_scenario(99, 24 * 60);
    let mut sim = Simulator::new(&cfg).unwrap();
    sim.setup();
    sim.run().unwrap();

    let horizon = cfg.horizon_minutes;
    for v in sim.vehicles() {
        if v.departure_minute <= horizon {
            assert!(
                matches!(v.status, VehicleStatus::Completed | VehicleStatus::Failed),
                "vehicle {} departs at {} (within horizon {}) but is still {:?}",
                v.id,
                v.departure_minute,
                horizon,
                v.status
            );
        }
    }
}

#[test]
fn rl_training_run_reduces_negative_reward_trend_has_logs_for_every_episode() {
    use charging_robots_sim::sim::kernel::run_episodes;

    let cfg = common::scenario_with_policy("rl", 55, 300);
    let (_rl, logs) = run_episodes(&cfg, 10).unwrap();
    assert_eq!(logs.len(), 10);
    for log in &logs {
        assert!(log.epsilon >= 0.05, "epsilon should never decay below its floor");
        assert!(log.epsilon <= 0.15, "epsilon should never exceed its initial value");
    }
}
