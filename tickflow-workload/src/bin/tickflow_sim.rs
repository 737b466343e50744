//! Tickflow simulation driver.
//!
//! Runs a scenario profile through the tick-driven pipeline and prints a
//! summary.
//!
//! ```bash
//! # List built-in profiles
//! tickflow-sim --list
//!
//! # Run a built-in profile and export the per-tick history
//! tickflow-sim --profile prefetch-window --output history.json
//!
//! # Run a profile from a TOML file with per-tick logging
//! tickflow-sim --profile-file profiles/deep-queue.toml --log-level debug
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tickflow_workload::{list_profiles, load_profile, run_profile, ScenarioProfile};

/// Tick-driven flow-control simulator.
#[derive(Parser, Debug)]
#[command(name = "tickflow-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Built-in profile to run.
    #[arg(long, default_value = "gate-dial")]
    profile: String,

    /// TOML profile to run instead of a built-in one.
    #[arg(long, conflicts_with = "profile")]
    profile_file: Option<PathBuf>,

    /// List built-in profiles and exit.
    #[arg(long)]
    list: bool,

    /// Override the profile's token count.
    #[arg(long)]
    tokens: Option<u64>,

    /// Override the profile's duration bound (ticks).
    #[arg(long)]
    duration: Option<u64>,

    /// Write the joined per-tick history as JSON.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: Level,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.list {
        for name in list_profiles() {
            let profile = load_profile(name)?;
            println!("{name:<18} {}", profile.description);
        }
        return Ok(());
    }

    let mut profile = match &args.profile_file {
        Some(path) => ScenarioProfile::from_file(path)?,
        None => load_profile(&args.profile)?,
    };
    if let Some(tokens) = args.tokens {
        profile.tokens = tokens;
        profile.traced.retain(|id| *id < tokens);
    }
    if args.duration.is_some() {
        profile.duration = args.duration;
    }

    info!(profile = %profile.name, tokens = profile.tokens, "Running scenario");
    let run = run_profile(&profile)?;

    if let Some(path) = &args.output {
        std::fs::write(path, run.outcome.history.to_json()?)?;
        info!(path = %path.display(), "Wrote history");
    }

    let summary = run.summary(&profile.name);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}
