//! CLI entrypoint for the suspend-policy probe.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rdv_debug::{launch_local, run_probe, ProbeConfig, ProbeConfigUpdate, Verdict};
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(
    name = "rdv-debug",
    version,
    about = "Verify event-group suspend policies against a rendezvous debuggee",
    after_help = "Examples:\n  rdv-debug\n  rdv-debug --config probe.toml --report report.json\n  RUST_LOG=rdv_debug=debug rdv-debug --workers 4"
)]
struct Cli {
    /// Probe configuration file (probe.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bound for every wait on the target, in minutes.
    #[arg(long = "wait-time")]
    wait_time: Option<u64>,
    /// Idle worker threads started by the debuggee.
    #[arg(long)]
    workers: Option<usize>,
    /// Scenario steps the debuggee announces before terminating.
    #[arg(long)]
    cases: Option<i32>,
    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Log snapshots and per-thread checks.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(Verdict::Passed) => ExitCode::SUCCESS,
        Ok(Verdict::Failed) => {
            println!("TEST FAILED");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("rdv-debug error: {err:#}");
            println!("TEST FAILED");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<Verdict> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    config.apply_update(ProbeConfigUpdate {
        wait_time_minutes: cli.wait_time,
        workers: cli.workers,
        cases: cli.cases,
        verbose: cli.verbose,
    })?;
    init_tracing(config.log_level);

    info!("starting rdv-debug probe");
    let target = launch_local(&config)?;
    let report = run_probe(&target, &config);
    eprintln!("{report}");

    if let Some(path) = &cli.report {
        let json = report.to_json().context("serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("write report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    Ok(report.verdict())
}

fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
