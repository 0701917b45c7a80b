//! Fleet charging simulator entry point — CLI wiring and config-driven runs.

use std::path::Path;
use std::process;

use charging_robots_sim::config::ScenarioConfig;
use charging_robots_sim::io::export::{export_robots_csv, export_vehicles_csv};
use charging_robots_sim::sim::kernel::{self, Simulator};

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    policy_override: Option<String>,
    seed_override: Option<u64>,
    horizon_override: Option<u32>,
    episodes: Option<u32>,
    vehicles_out: Option<String>,
    robots_out: Option<String>,
    verbose: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("charging-robots-sim — discrete-event fleet charging robot simulator");
    eprintln!();
    eprintln!("Usage: charging-robots-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>      Load scenario from TOML config file");
    eprintln!("  --preset <name>        Use a built-in scale preset (small, medium, large)");
    eprintln!("  --policy <name>        Override the dispatch policy");
    eprintln!("                         (nearest_first, max_charge_need_first,");
    eprintln!("                          earliest_deadline_first, most_urgent_first,");
    eprintln!("                          hybrid_strategy, rl)");
    eprintln!("  --seed <u64>           Override the random seed");
    eprintln!("  --horizon <minutes>    Override the simulation horizon");
    eprintln!("  --episodes <n>         Train the rl policy over n episodes instead of one run");
    eprintln!("  --vehicles-out <path>  Export per-vehicle summary to CSV");
    eprintln!("  --robots-out <path>    Export per-robot summary to CSV");
    eprintln!("  --verbose              Log every arrival, assignment, completion, and failure to stderr");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                Start the snapshot API server after the run");
        eprintln!("  --port <u16>           API server port (default: 3000)");
    }
    eprintln!("  --help                 Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the small preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        policy_override: None,
        seed_override: None,
        horizon_override: None,
        episodes: None,
        vehicles_out: None,
        robots_out: None,
        verbose: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(expect_value(&args, &mut i, "--scenario")),
            "--preset" => cli.preset = Some(expect_value(&args, &mut i, "--preset")),
            "--policy" => cli.policy_override = Some(expect_value(&args, &mut i, "--policy")),
            "--seed" => {
                let raw = expect_value(&args, &mut i, "--seed");
                cli.seed_override = Some(parse_or_exit(&raw, "--seed", "a valid u64"));
            }
            "--horizon" => {
                let raw = expect_value(&args, &mut i, "--horizon");
                cli.horizon_override = Some(parse_or_exit(&raw, "--horizon", "a valid u32"));
            }
            "--episodes" => {
                let raw = expect_value(&args, &mut i, "--episodes");
                cli.episodes = Some(parse_or_exit(&raw, "--episodes", "a valid u32"));
            }
            "--vehicles-out" => cli.vehicles_out = Some(expect_value(&args, &mut i, "--vehicles-out")),
            "--robots-out" => cli.robots_out = Some(expect_value(&args, &mut i, "--robots-out")),
            "--verbose" => cli.verbose = true,
            #[cfg(feature = "api")]
            "--serve" => cli.serve = true,
            #[cfg(feature = "api")]
            "--port" => {
                let raw = expect_value(&args, &mut i, "--port");
                cli.port = parse_or_exit(&raw, "--port", "a valid u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn expect_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {flag} requires an argument");
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_or_exit<T: std::str::FromStr>(raw: &str, flag: &str, expectation: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not {expectation}");
        process::exit(1);
    })
}

fn load_scenario(cli: &CliArgs) -> ScenarioConfig {
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::small()
    };

    if let Some(ref policy) = cli.policy_override {
        scenario.policy = policy.clone();
    }
    if let Some(seed) = cli.seed_override {
        scenario.seed = seed;
    }
    if let Some(horizon) = cli.horizon_override {
        scenario.horizon_minutes = horizon;
    }
    if cli.verbose {
        scenario.verbose = true;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    scenario
}

fn main() {
    let cli = parse_args();
    let scenario = load_scenario(&cli);

    if let Some(episodes) = cli.episodes {
        let (_rl, logs) = kernel::run_episodes(&scenario, episodes).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        });
        for log in &logs {
            println!(
                "episode {:>3}: reward {:>8.1}  rolling_mean {:>8.1}  epsilon {:.3}",
                log.episode, log.total_reward, log.rolling_mean, log.epsilon
            );
        }
        return;
    }

    let mut sim = Simulator::new(&scenario).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    sim.setup();
    let stats = sim.run().unwrap_or_else(|e| {
        eprintln!("fatal: {e}");
        process::exit(1);
    });

    println!("{stats}");

    if let Some(ref path) = cli.vehicles_out {
        if let Err(e) = export_vehicles_csv(sim.vehicles(), Path::new(path)) {
            eprintln!("error: failed to write vehicle CSV: {e}");
            process::exit(1);
        }
        eprintln!("Vehicle summary written to {path}");
    }
    if let Some(ref path) = cli.robots_out {
        if let Err(e) = export_robots_csv(sim.robots(), scenario.horizon_minutes, Path::new(path)) {
            eprintln!("error: failed to write robot CSV: {e}");
            process::exit(1);
        }
        eprintln!("Robot summary written to {path}");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        use charging_robots_sim::api::{AppState, Snapshot, serve};

        let snapshot = Snapshot {
            current_time: sim.current_time(),
            scenario: scenario.clone(),
            vehicles: sim.vehicles().to_vec(),
            robots: sim.robots().to_vec(),
            batteries: sim.batteries().to_vec(),
            stats,
        };
        let state = Arc::new(AppState { snapshot });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        rt.block_on(serve(state, addr));
    }
}
