//! Pacer simulator.
//!
//! Runs seeded workloads against the throttled publisher and reports any
//! violated guarantee. Exits non-zero if a run found violations.
//!
//! ```bash
//! # One run of a built-in profile.
//! pacer-sim --profile burst --seed 42
//!
//! # Sweep 100 seeds starting at 1000.
//! pacer-sim --profile nack-storm --seed 1000 --runs 100
//!
//! # A custom profile from TOML.
//! pacer-sim --config my-profile.toml --log-level debug
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pacer_workload::{list_profiles, load_profile, SimulationProfile, Workload};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Seeded simulation of a confirm-throttled publisher.
#[derive(Parser, Debug)]
#[command(name = "pacer-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Built-in profile to run.
    #[arg(long, default_value = "baseline")]
    profile: String,

    /// TOML profile file; takes precedence over `--profile`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed of the first run.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of runs; run `i` uses `seed + i`.
    #[arg(long, default_value = "1")]
    runs: u64,

    /// Override the number of operations per run.
    #[arg(long)]
    operations: Option<u64>,

    /// Override the initial throttle.
    #[arg(long)]
    throttle: Option<usize>,

    /// List built-in profiles and exit.
    #[arg(long)]
    list_profiles: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_profiles {
        for name in list_profiles() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut profile = match &args.config {
        Some(path) => SimulationProfile::from_file(path)?,
        None => load_profile(&args.profile)?,
    };
    if let Some(operations) = args.operations {
        profile.workload.operations = operations;
    }
    if let Some(throttle) = args.throttle {
        profile.workload.throttle = throttle;
    }

    info!(
        profile = %profile.name,
        seed = args.seed,
        runs = args.runs,
        operations = profile.workload.operations,
        throttle = profile.workload.throttle,
        "Starting simulation"
    );

    let mut failed_runs = 0_u64;
    for run in 0..args.runs {
        let mut config = profile.workload.clone();
        config.seed = args.seed.wrapping_add(run);

        let stats = Workload::new(config)?.run();
        println!(
            "seed={} ops={} published={} rejected={} nacked={} dispatch_failures={} tag_mismatches={} max_unacked={} closed={} violations={}",
            stats.seed,
            stats.operations_total,
            stats.publishes_accepted,
            stats.publishes_rejected,
            stats.nacked,
            stats.dispatch_failures,
            stats.tag_mismatches,
            stats.max_unacknowledged,
            stats.closed,
            stats.violations.len(),
        );

        if !stats.is_ok() {
            failed_runs += 1;
            for violation in &stats.violations {
                error!(seed = stats.seed, "{violation}");
            }
        }
    }

    if failed_runs > 0 {
        error!(failed_runs, "Simulation found violations");
        return Ok(ExitCode::FAILURE);
    }
    info!("All runs clean");
    Ok(ExitCode::SUCCESS)
}
