//! Operator interaction: confirmation prompts and countdown display.
//!
//! The coordinator only sees the [`Interaction`] capability; providers are
//! `gum`, a plain terminal prompt, and a headless fallback.

mod gum;
mod terminal;

use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, PromptKind};

pub use gum::GumPrompt;
pub use terminal::PlainPrompt;

/// How often blocking prompts check for cancellation and timeout.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
    TimedOut,
    /// The prompt was withdrawn before an answer arrived.
    Cancelled,
}

/// Capability used to talk to the operator.
///
/// `confirm` blocks; callers run it off the async executor.
pub trait Interaction: Send + Sync {
    /// Ask a yes/no question, giving up after `timeout` or when `cancel` fires.
    fn confirm(&self, prompt: &str, timeout: Duration, cancel: &CancellationToken) -> Confirmation;

    /// Show the time left before shutdown.
    fn show_countdown(&self, remaining: Duration);

    /// Clear any countdown display after an abort.
    fn clear(&self) {}

    /// Whether someone can actually answer `confirm`.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Provider for machines without an operator at a terminal.
///
/// Nobody can answer, so confirmation always times out.
#[derive(Debug, Default)]
pub struct Headless;

impl Interaction for Headless {
    fn confirm(&self, prompt: &str, _timeout: Duration, _cancel: &CancellationToken) -> Confirmation {
        warn!("No terminal to confirm '{}'; use --no-confirm for unattended shutdown", prompt);
        Confirmation::TimedOut
    }

    fn show_countdown(&self, remaining: Duration) {
        let secs = remaining.as_secs();
        if secs % 10 == 0 || secs <= 5 {
            info!("Shutting down in {}s", secs);
        }
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Pick the configured provider.
pub fn from_config(config: &Config) -> Result<Arc<dyn Interaction>> {
    let interactive = std::io::stdin().is_terminal();

    let provider: Arc<dyn Interaction> = match config.prompt {
        PromptKind::Gum => Arc::new(GumPrompt::new(find_gum(config.gum_path.as_deref())?)),
        PromptKind::Plain => Arc::new(PlainPrompt::new()),
        PromptKind::Headless => Arc::new(Headless),
        PromptKind::Auto if !interactive => Arc::new(Headless),
        PromptKind::Auto => match find_gum(config.gum_path.as_deref()) {
            Ok(path) => Arc::new(GumPrompt::new(path)),
            Err(_) => Arc::new(PlainPrompt::new()),
        },
    };

    Ok(provider)
}

/// Find the gum binary.
fn find_gum(configured_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Configured gum path does not exist: {}", path.display());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join("gum");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    anyhow::bail!("gum not found on PATH. See https://github.com/charmbracelet/gum")
}

/// Render a duration as `1m05s` / `42s`.
pub(crate) fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_never_confirms() {
        let cancel = CancellationToken::new();
        let answer = Headless.confirm("Shut down?", Duration::from_secs(30), &cancel);
        assert_eq!(answer, Confirmation::TimedOut);
        assert!(!Headless.is_interactive());
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_secs(42)), "42s");
        assert_eq!(format_remaining(Duration::from_secs(65)), "1m05s");
        assert_eq!(format_remaining(Duration::from_millis(900)), "0s");
    }

    #[test]
    fn test_find_gum_configured_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(find_gum(Some(file.path())).unwrap(), file.path());

        let err = find_gum(Some(Path::new("/nonexistent/gum"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_providers() {
        let config = Config {
            prompt: PromptKind::Headless,
            ..Default::default()
        };
        assert!(from_config(&config).is_ok());

        let config = Config {
            prompt: PromptKind::Gum,
            gum_path: Some(PathBuf::from("/nonexistent/gum")),
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }
}
