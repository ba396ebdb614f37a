use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach the controller over SSH and how long to wait on it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Connect on first use instead of failing with "Not connected"
    pub auto_connect: bool,
    /// Seconds
    pub connect_timeout: f64,
    /// Seconds to wait for each get/set reply
    pub gpascii_timeout: f64,
    /// Seconds the raw `gpascii` command keeps reading
    pub raw_read_timeout: f64,
    /// Remote program spoken to over the line channel
    pub gpascii_program: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "10.0.0.98".to_string(),
            port: 22,
            user: "root".to_string(),
            password: "deltatau".to_string(),
            auto_connect: true,
            connect_timeout: 5.0,
            gpascii_timeout: 2.0,
            raw_read_timeout: 0.5,
            gpascii_program: "gpascii -2".to_string(),
        }
    }
}

/// Upper bound on any configured timeout.
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Clamped to `0..=MAX_TIMEOUT_SECS`; NaN is zero.
fn timeout(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_TIMEOUT_SECS)).unwrap_or_default()
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        timeout(self.connect_timeout)
    }

    pub fn gpascii_timeout(&self) -> Duration {
        timeout(self.gpascii_timeout)
    }

    pub fn raw_read_timeout(&self) -> Duration {
        timeout(self.raw_read_timeout)
    }

    pub fn apply(&mut self, overrides: &ConnectionOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }

        if let Some(port) = overrides.port {
            self.port = port;
        }

        if let Some(user) = &overrides.user {
            self.user = user.clone();
        }

        if let Some(password) = &overrides.password {
            self.password = password.clone();
        }
    }
}

/// Per-connection overrides, as given on the command line or to `connect`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ConnectionOverrides {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.user.is_none() && self.password.is_none()
    }
}
