//! OS shutdown backends.
//!
//! Shutdown is a one-shot, non-idempotent action: implementations report
//! failure and never retry.

mod command;
mod logind;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ShutdownMethod};

pub use command::CommandPower;
pub use logind::LogindPower;

/// Errors from the shutdown call.
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shutdown command exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("logind PowerOff failed: {0}")]
    Logind(String),
}

/// Trait for shutdown backends.
#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Power the machine off now.
    async fn shutdown_now(&self) -> Result<(), ShutdownError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Logs instead of shutting down.
#[derive(Debug)]
pub struct DryRunPower {
    inner: String,
}

#[async_trait]
impl PowerControl for DryRunPower {
    async fn shutdown_now(&self) -> Result<(), ShutdownError> {
        info!("[DRY RUN] Would shut down via {}", self.inner);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("dry run ({})", self.inner)
    }
}

/// Build the configured backend.
pub fn from_config(config: &Config) -> Box<dyn PowerControl> {
    let backend: Box<dyn PowerControl> = match config.shutdown_method {
        ShutdownMethod::Command => Box::new(CommandPower::new(config.shutdown_command.clone())),
        ShutdownMethod::Logind => Box::new(LogindPower),
    };

    if config.dry_run {
        Box::new(DryRunPower {
            inner: backend.describe(),
        })
    } else {
        backend
    }
}
