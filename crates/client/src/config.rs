use serde::Deserialize;
use std::time::Duration;

/// Settings for the member-side unlock flow.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the door access API, e.g. `https://doors.example.com`.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a live scan listens for the door beacon.
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    /// Upper bound for stopping the radio after a scan is cancelled.
    #[serde(default = "default_cancel_bound_ms")]
    pub cancel_bound_ms: u64,

    /// How long to wait for the user to answer a permission prompt.
    #[serde(default = "default_permission_timeout_ms")]
    pub permission_timeout_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_scan_window_ms() -> u64 {
    5_000
}

fn default_cancel_bound_ms() -> u64 {
    500
}

fn default_permission_timeout_ms() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_ms: default_request_timeout_ms(),
            scan_window_ms: default_scan_window_ms(),
            cancel_bound_ms: default_cancel_bound_ms(),
            permission_timeout_ms: default_permission_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn cancel_bound(&self) -> Duration {
        Duration::from_millis(self.cancel_bound_ms)
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }
}
