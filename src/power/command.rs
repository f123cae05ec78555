//! Shutdown by running an external command (default `shutdown -h now`).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{PowerControl, ShutdownError};

#[derive(Debug, Clone)]
pub struct CommandPower {
    argv: Vec<String>,
}

impl CommandPower {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl PowerControl for CommandPower {
    async fn shutdown_now(&self) -> Result<(), ShutdownError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ShutdownError::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        info!("Executing: {}", self.argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ShutdownError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        if output.status.success() {
            debug!("{} succeeded", program);
            Ok(())
        } else {
            Err(ShutdownError::Exited {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        self.argv.join(" ")
    }
}
