//! Boundary to the platform's short-range radio.
//!
//! The readiness state machine and the live observation producer only talk
//! to the radio through [`ProximityAdapter`]. A platform binding implements it;
//! tests use a scripted fake.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::readiness::NotificationSink;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Radio platform error: {0}")]
    Platform(String),
}

/// What a capability probe found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityReport {
    pub supported: bool,
    pub permission_granted: bool,
    pub powered_on: bool,
}

/// Unsolicited change reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterNotification {
    PoweredOn,
    PoweredOff,
    PermissionGranted,
    PermissionRevoked,
}

/// One beacon advertisement heard during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub beacon_id: String,
    pub signal_strength: i32,
    pub received_at: DateTime<Utc>,
}

/// Event delivered while a scan runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Advertisement(Advertisement),
    /// The radio was switched off mid-scan.
    PoweredOff,
}

/// Registration of the power-state listener. Dropping it without calling
/// [`ListenerRegistration::unregister`] leaks the platform listener.
pub trait ListenerRegistration: Send + Sync {
    fn unregister(self: Box<Self>);
}

/// A running radio scan.
#[async_trait::async_trait]
pub trait ScanSession: Send {
    /// Stop scanning and release the radio.
    async fn stop(self: Box<Self>);
}

#[async_trait::async_trait]
pub trait ProximityAdapter: Send + Sync {
    async fn probe_capability(&self) -> Result<CapabilityReport, AdapterError>;

    /// Shows the platform permission prompt. Returns whether it was granted.
    async fn request_permission(&self) -> Result<bool, AdapterError>;

    /// Registers the process-wide power/permission listener.
    fn subscribe_power_state(&self, sink: NotificationSink) -> Box<dyn ListenerRegistration>;

    /// Starts scanning; events arrive on `events` until the session is stopped.
    fn start_scan(
        &self,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<Box<dyn ScanSession>, AdapterError>;

    /// Opens the system radio settings. UI hint only.
    fn open_settings(&self);
}
