//! Plain y/N prompt on stderr, answered on stdin.

use std::io::{BufRead, Write};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Confirmation, Interaction, POLL_INTERVAL, format_remaining};

/// Prompt reading answers from a single background stdin reader.
///
/// A cancelled prompt cannot interrupt a blocking stdin read, so one reader
/// thread lives for the whole process and prompts share its lines.
pub struct PlainPrompt {
    lines: Mutex<Receiver<String>>,
}

impl PlainPrompt {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        break;
                    }
                }
            }
        });

        Self::from_lines(rx)
    }

    fn from_lines(lines: Receiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }
}

impl Default for PlainPrompt {
    fn default() -> Self {
        Self::new()
    }
}

/// Only `y` or `yes` (any case) confirms.
fn parse_answer(line: &str) -> Confirmation {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Confirmed,
        _ => Confirmation::Declined,
    }
}

impl Interaction for PlainPrompt {
    fn confirm(&self, prompt: &str, timeout: Duration, cancel: &CancellationToken) -> Confirmation {
        let Ok(lines) = self.lines.lock() else {
            warn!("Prompt reader poisoned, declining");
            return Confirmation::Declined;
        };

        // Drop anything typed before the question was asked
        while lines.try_recv().is_ok() {}

        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r\x1b[2K{} [y/N] (auto-decline in {}): ",
            prompt,
            format_remaining(timeout)
        );
        let _ = stderr.flush();

        let deadline = Instant::now() + timeout;
        let answer = loop {
            if cancel.is_cancelled() {
                break Confirmation::Cancelled;
            }
            if Instant::now() >= deadline {
                break Confirmation::TimedOut;
            }

            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => break parse_answer(&line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break Confirmation::Declined,
            }
        };

        if answer != Confirmation::Confirmed {
            let _ = writeln!(stderr);
        }
        answer
    }

    fn show_countdown(&self, remaining: Duration) {
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r\x1b[2KIdle. Shutting down in {} (any activity cancels)",
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
