use clap::Parser;
use keeper_shared::artifacts::ArtifactExt;
use libc::pid_t;
use proctree::Session;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod event_source;
mod monitor;
mod prelude;

use config::KeeperConfig;
use prelude::*;

#[derive(Parser)]
#[command(name = "proc-keeper")]
#[command(
    version,
    about = "Follow the process tree of a job and kill every descendant once it ends"
)]
struct Cli {
    /// Pid of the job process to watch
    #[arg(long)]
    watched: pid_t,

    /// Pid whose exit also terminates the tree, e.g. a wrapper around the job
    /// (defaults to the watched pid)
    #[arg(long)]
    trigger: Option<pid_t>,

    /// File of fork/exit events, one per line (defaults to stdin)
    #[arg(long)]
    events: Option<PathBuf>,

    /// Output folder for the reap report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Interval between CPU usage samples, in milliseconds
    #[arg(long, env = "PROC_KEEPER_SAMPLE_INTERVAL_MS")]
    sample_interval_ms: Option<u64>,

    /// Name of the configuration file to load instead of config.yaml
    #[arg(long)]
    config_name: Option<String>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .parse_env(env_logger::Env::new().filter_or("PROC_KEEPER_LOG", "info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let complete = keep(cli)?;

    std::process::exit(if complete { 0 } else { 1 });
}

/// Monitor the job described by `cli`, returning whether its tree was fully reaped
fn keep(cli: Cli) -> Result<bool> {
    let config = KeeperConfig::load(cli.config_name.as_deref())?;
    let sample_interval = cli
        .sample_interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.sample_interval());
    ensure!(
        !sample_interval.is_zero(),
        "The sample interval must be greater than zero"
    );
    ensure!(cli.watched > 0, "Invalid watched pid: {}", cli.watched);
    let trigger = cli.trigger.unwrap_or(cli.watched);
    let output_dir = cli.output.or(config.output_dir);

    let events = event_source::open(cli.events.as_deref())?;

    let mut session = Session::new();
    session.initialize(cli.watched, trigger)?;
    let summary = monitor::run(&mut session, events, sample_interval)?;

    if let Some(output_dir) = output_dir {
        let path = monitor::to_report(&summary)
            .save_with_pid_to(&output_dir, summary.watched)
            .context("Failed to save the reap report")?;
        info!("Reap report written to {}", path.display());
    }

    Ok(summary.complete)
}
