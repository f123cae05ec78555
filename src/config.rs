//! Configuration loading, defaults and validation for lovemeorleaveme.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Largest sliding window the daemon accepts (about 12 days at 1s samples).
pub const MAX_WINDOW_LEN: usize = 1 << 20;

/// Where CPU utilization is read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CpuSourceKind {
    /// Aggregate `cpu` line of `/proc/stat` (Linux).
    ProcStat,
    /// Portable global CPU usage via `sysinfo`.
    Sysinfo,
}

impl Default for CpuSourceKind {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Self::ProcStat
        } else {
            Self::Sysinfo
        }
    }
}

/// Which interaction provider renders prompts and the countdown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// gum when available on an interactive terminal, plain prompt otherwise.
    #[default]
    Auto,
    /// Always use `gum confirm`.
    Gum,
    /// Plain stderr/stdin prompt.
    Plain,
    /// No terminal: log the countdown, never confirm.
    Headless,
}

/// How the machine is powered off.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMethod {
    /// Run `shutdown_command`.
    #[default]
    Command,
    /// Call `PowerOff` on systemd-logind over the system bus.
    Logind,
}

/// Invalid configuration values. Fatal at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("busy threshold must be in (0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("idle minutes must be greater than zero")]
    ZeroIdleMinutes,

    #[error("sample interval must be greater than zero")]
    ZeroSampleInterval,

    #[error("confirmation timeout must be greater than zero when confirmation is enabled")]
    ZeroConfirmTimeout,

    #[error("shutdown_command must not be empty when shutdown_method is \"command\"")]
    EmptyShutdownCommand,

    #[error("idle period needs {len} samples, more than the maximum of {max}; raise sample_interval_seconds or lower idle_minutes")]
    WindowTooLarge { len: usize, max: usize },
}

/// Main configuration for lovemeorleaveme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes the CPU must stay quiet before the countdown starts (default: 30).
    pub idle_minutes: u64,

    /// Busy fraction below which a reading counts as quiet (default: 0.05).
    pub busy_threshold: f64,

    /// Seconds between CPU samples (default: 5).
    pub sample_interval_seconds: u64,

    /// Seconds between sustained idle and shutdown (default: 60).
    pub countdown_seconds: u64,

    /// Ask for confirmation before shutting down (default: true).
    pub confirm: bool,

    /// Seconds to wait for an answer before treating it as a decline (default: 30).
    pub confirm_timeout_seconds: u64,

    /// Seconds to stay in the aborted state after a failed shutdown (default: 300).
    pub failure_cooldown_seconds: u64,

    /// Treat recent user input, as reported by systemd-logind, as activity.
    pub watch_input: bool,

    /// CPU utilization source.
    pub cpu_source: CpuSourceKind,

    /// Prompt provider.
    pub prompt: PromptKind,

    /// Path to the gum binary. If unset, searches PATH.
    pub gum_path: Option<PathBuf>,

    /// How to power off the machine.
    pub shutdown_method: ShutdownMethod,

    /// Command run when `shutdown_method` is "command".
    pub shutdown_command: Vec<String>,

    /// Dry run mode: log the shutdown instead of performing it.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_minutes: 30,
            busy_threshold: 0.05,
            sample_interval_seconds: 5,
            countdown_seconds: 60,
            confirm: true,
            confirm_timeout_seconds: 30,
            failure_cooldown_seconds: 300,
            watch_input: false,
            cpu_source: CpuSourceKind::default(),
            prompt: PromptKind::default(),
            gum_path: None,
            shutdown_method: ShutdownMethod::default(),
            shutdown_command: vec!["shutdown".to_string(), "-h".to_string(), "now".to_string()],
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("lovemeorleaveme").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.busy_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ConfigError::ThresholdOutOfRange(self.busy_threshold));
        }
        if self.idle_minutes == 0 {
            return Err(ConfigError::ZeroIdleMinutes);
        }
        if self.sample_interval_seconds == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        let len = self.window_len();
        if len > MAX_WINDOW_LEN {
            return Err(ConfigError::WindowTooLarge {
                len,
                max: MAX_WINDOW_LEN,
            });
        }
        if self.confirm && self.confirm_timeout_seconds == 0 {
            return Err(ConfigError::ZeroConfirmTimeout);
        }
        if self.shutdown_method == ShutdownMethod::Command && self.shutdown_command.is_empty() {
            return Err(ConfigError::EmptyShutdownCommand);
        }
        Ok(())
    }

    /// Number of readings that must all be quiet for idle to be sustained.
    pub fn window_len(&self) -> usize {
        let idle_seconds = self.idle_minutes.saturating_mul(60);
        let interval = self.sample_interval_seconds.max(1);
        usize::try_from(idle_seconds.div_ceil(interval))
            .unwrap_or(usize::MAX)
            .max(1)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_seconds)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_seconds)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_seconds)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_seconds)
    }
}
