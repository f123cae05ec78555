//! Keyboard/mouse activity from systemd-logind.
//!
//! With `watch_input` on, each sampling tick reads the session's `IdleHint`.
//! A session that is not idle marks the reading as input-active, which keeps
//! the policy from reporting sustained idle even when the CPU is quiet.

use std::env;

use anyhow::Context;
use anyhow::Result;
use tracing::debug;
use tracing::info;
use tracing::trace;
use zbus::Connection;

use super::{LOGIND_PATH, LOGIND_SERVICE, MANAGER_INTERFACE};

const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Resolved logind session whose idle hint is polled each tick.
#[derive(Debug, Clone)]
pub struct LogindSession {
    conn: Connection,
    path: String,
}

impl LogindSession {
    /// Connect to the system bus and resolve the current session.
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system()
            .await
            .context("Failed to connect to system DBus")?;

        let path = resolve_session_path(&conn).await?;
        info!("Watching input on session {}", path);

        Ok(Self { conn, path })
    }

    /// Whether the session currently reports itself idle.
    ///
    /// Unbounded; the sampling loop caps each call at one interval.
    pub async fn idle_hint(&self) -> Result<bool> {
        let idle = read_idle_hint(&self.conn, &self.path).await?;
        trace!("Session idle hint: {}", idle);
        Ok(idle)
    }
}

/// Find the session the daemon was started from.
///
/// Prefers `XDG_SESSION_ID`; a daemon started outside a login shell falls back
/// to logind's `self` and `auto` aliases, keeping the first whose hint reads.
async fn resolve_session_path(conn: &Connection) -> Result<String> {
    if let Ok(session_id) = env::var("XDG_SESSION_ID") {
        debug!("Using XDG_SESSION_ID: {}", session_id);

        let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .context("Failed to create Manager proxy")?;

        let path: zbus::zvariant::OwnedObjectPath = proxy
            .call("GetSession", &(&session_id,))
            .await
            .context("GetSession call failed")?;

        return Ok(path.to_string());
    }

    debug!("XDG_SESSION_ID not set, probing self/auto sessions");

    for alias in ["self", "auto"] {
        let path = format!("{LOGIND_PATH}/session/{alias}");
        if read_idle_hint(conn, &path).await.is_ok() {
            return Ok(path);
        }
    }

    anyhow::bail!(
        "Could not resolve logind session. Set XDG_SESSION_ID or run inside a logind session."
    )
}

/// Read `IdleHint` for one session. Also used to probe whether an alias resolves.
async fn read_idle_hint(conn: &Connection, session_path: &str) -> Result<bool> {
    let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, session_path, PROPERTIES_INTERFACE)
        .await
        .context("Failed to create Properties proxy")?;

    let value: zbus::zvariant::OwnedValue = proxy
        .call("Get", &(SESSION_INTERFACE, "IdleHint"))
        .await
        .context("Failed to get IdleHint property")?;

    value
        .downcast_ref::<bool>()
        .map_err(|_| anyhow::anyhow!("IdleHint is not a boolean"))
}
