//! Confirmation through `gum confirm`.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Confirmation, Interaction, POLL_INTERVAL, format_remaining};

/// Prompts with charmbracelet's gum.
#[derive(Debug)]
pub struct GumPrompt {
    binary: PathBuf,
}

impl GumPrompt {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn build_args(prompt: &str, timeout: Duration) -> Vec<String> {
        vec![
            "confirm".to_string(),
            "--default=false".to_string(),
            "--affirmative=Shut down".to_string(),
            "--negative=Keep running".to_string(),
            format!("--timeout={}s", timeout.as_secs().max(1)),
            prompt.to_string(),
        ]
    }
}

/// Map gum's exit status: 0 confirms, everything else declines.
fn confirmation_for(status: ExitStatus) -> Confirmation {
    if status.success() {
        Confirmation::Confirmed
    } else {
        debug!("gum confirm exited with {:?}", status.code());
        Confirmation::Declined
    }
}

/// Kill a prompt that is no longer wanted.
fn abandon(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill gum: {}", e);
    }
    let _ = child.wait();
}

impl Interaction for GumPrompt {
    fn confirm(&self, prompt: &str, timeout: Duration, cancel: &CancellationToken) -> Confirmation {
        let mut child = match Command::new(&self.binary)
            .args(Self::build_args(prompt, timeout))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.binary.display(), e);
                return Confirmation::Declined;
            }
        };

        // gum's own timeout picks the default answer; enforce ours as well.
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                abandon(&mut child);
                return Confirmation::Cancelled;
            }

            match child.try_wait() {
                Ok(Some(status)) => return confirmation_for(status),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to wait for gum: {}", e);
                    abandon(&mut child);
                    return Confirmation::Declined;
                }
            }

            if Instant::now() >= deadline {
                abandon(&mut child);
                return Confirmation::TimedOut;
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn show_countdown(&self, remaining: Duration) {
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r\x1b[2KIdle. Shutting down in {}",
            format_remaining(remaining)
        );
        let _ = stderr.flush();
    }

    fn clear(&self) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }
}
