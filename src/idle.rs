//! User-input idle detection.
//!
//! Provides the session idle hint via the systemd-logind `DBus` interface.

mod logind;

pub use logind::LogindSession;

/// `DBus` service and path for login1.
pub(crate) const LOGIND_SERVICE: &str = "org.freedesktop.login1";
pub(crate) const LOGIND_PATH: &str = "/org/freedesktop/login1";
pub(crate) const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
