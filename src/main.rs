//! lovemeorleaveme - Monitors CPU idle and shuts down the system if idle conditions are met.

use anyhow::{Context, Result};
use clap::Parser;
use lovemeorleaveme::config::Config;
use lovemeorleaveme::daemon::{self, Outcome};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Monitors CPU idle and shuts down the system if idle conditions are met.
#[derive(Parser, Debug)]
#[command(name = "lovemeorleaveme")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Minutes the CPU must stay idle before shutting down.
    #[arg(long, value_name = "N")]
    idle_minutes: Option<u64>,

    /// CPU busy fraction (0-1] below which the machine counts as idle.
    #[arg(long, value_name = "F")]
    threshold: Option<f64>,

    /// Shut down without asking for confirmation.
    #[arg(long)]
    no_confirm: bool,

    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between CPU samples.
    #[arg(long, value_name = "N")]
    interval_seconds: Option<u64>,

    /// Seconds to count down before shutting down.
    #[arg(long, value_name = "N")]
    countdown_seconds: Option<u64>,

    /// Treat keyboard/mouse activity (via systemd-logind) as activity.
    #[arg(long)]
    watch_input: bool,

    /// Enable dry-run mode (log instead of shutting down).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Apply command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(minutes) = self.idle_minutes {
            config.idle_minutes = minutes;
        }
        if let Some(threshold) = self.threshold {
            config.busy_threshold = threshold;
        }
        if let Some(interval) = self.interval_seconds {
            config.sample_interval_seconds = interval;
        }
        if let Some(countdown) = self.countdown_seconds {
            config.countdown_seconds = countdown;
        }
        if self.no_confirm {
            config.confirm = false;
        }
        if self.watch_input {
            config.watch_input = true;
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("lovemeorleaveme v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!("Configuration loaded (dry_run={})", config.dry_run);

    match daemon::run(&config).await? {
        Outcome::PoweredOff => info!("Shutdown requested, exiting"),
        Outcome::Interrupted => info!("Interrupted, exiting"),
        Outcome::SamplerStopped => anyhow::bail!("Sampler stopped unexpectedly"),
    }

    Ok(())
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("lovemeorleaveme={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "lovemeorleaveme",
            "--idle-minutes",
            "10",
            "--threshold",
            "0.2",
            "--no-confirm",
            "--dry-run",
        ]);

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.idle_minutes, 10);
        assert!((config.busy_threshold - 0.2).abs() < f64::EPSILON);
        assert!(!config.confirm);
        assert!(config.dry_run);
        // Untouched values keep their defaults
        assert_eq!(config.sample_interval_seconds, 5);
        assert!(!config.watch_input);
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let args = Args::parse_from(["lovemeorleaveme"]);
        let mut config = Config {
            idle_minutes: 90,
            confirm: false,
            ..Default::default()
        };
        args.apply(&mut config);
        assert_eq!(config.idle_minutes, 90);
        assert!(!config.confirm);
    }

    #[test]
    fn test_args_are_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
