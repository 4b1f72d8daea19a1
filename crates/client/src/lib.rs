//! Member-side proximity unlock.
//!
//! This crate contains:
//! - The adapter readiness state machine
//! - Live and simulated proximity observation producers
//! - An HTTP client for the door access API

pub mod adapter;
pub mod config;
pub mod observation;
pub mod readiness;
pub mod testing;
pub mod unlock;

pub use adapter::{ProximityAdapter, ScanEvent};
pub use config::ClientConfig;
pub use observation::{ObservationError, ObservationProvider};
pub use readiness::{AdapterReadiness, AdapterReadinessState, ReadinessError, Subscription};
pub use unlock::{ClientError, UnlockClient};
