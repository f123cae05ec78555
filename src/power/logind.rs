//! Shutdown via systemd-logind `PowerOff` over the system bus.

use async_trait::async_trait;
use tracing::info;
use zbus::Connection;

use super::{PowerControl, ShutdownError};
use crate::idle::{LOGIND_PATH, LOGIND_SERVICE, MANAGER_INTERFACE};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogindPower;

#[async_trait]
impl PowerControl for LogindPower {
    async fn shutdown_now(&self) -> Result<(), ShutdownError> {
        let conn = Connection::system()
            .await
            .map_err(|e| ShutdownError::Logind(format!("system bus: {e}")))?;

        let proxy = zbus::Proxy::new(&conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .map_err(|e| ShutdownError::Logind(format!("Manager proxy: {e}")))?;

        info!("Calling {}.PowerOff", MANAGER_INTERFACE);

        // interactive=false: fail instead of prompting polkit for a password
        proxy
            .call_method("PowerOff", &(false,))
            .await
            .map_err(|e| ShutdownError::Logind(e.to_string()))?;

        Ok(())
    }

    fn describe(&self) -> String {
        "logind PowerOff".to_string()
    }
}
