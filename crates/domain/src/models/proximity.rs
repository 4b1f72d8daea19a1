//! Proximity observation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Signal strength carried by simulated observations. It is never compared
/// against a door threshold; the value only marks the reading as synthetic.
pub const SIMULATED_SIGNAL_STRENGTH: i32 = i32::MIN;

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    Live,
    Simulated,
}

impl std::fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationSource::Live => write!(f, "live"),
            ObservationSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// A single beacon sighting presented as evidence of being at a door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProximityObservation {
    pub beacon_id: String,
    /// RSSI in dBm; larger (less negative) is closer.
    pub signal_strength: i32,
    pub source: ObservationSource,
    pub captured_at: DateTime<Utc>,
}

impl ProximityObservation {
    /// Observation from a real radio scan.
    pub fn live(beacon_id: impl Into<String>, signal_strength: i32) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            signal_strength,
            source: ObservationSource::Live,
            captured_at: Utc::now(),
        }
    }

    /// Observation fabricated for test mode.
    pub fn simulated(beacon_id: impl Into<String>) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            signal_strength: SIMULATED_SIGNAL_STRENGTH,
            source: ObservationSource::Simulated,
            captured_at: Utc::now(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.source == ObservationSource::Simulated
    }
}

lazy_static::lazy_static! {
    /// Beacon identifiers: iBeacon `uuid:major:minor`, Eddystone namespace/instance
    /// or MAC-style ids.
    pub static ref BEACON_ID_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9:._-]*$").unwrap();
}

/// Observation as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ObservationPayload {
    #[validate(length(min = 1, max = 64, message = "Beacon ID must be 1-64 characters"))]
    #[validate(regex(path = *BEACON_ID_REGEX, message = "Invalid beacon ID format"))]
    pub beacon_id: String,

    pub signal_strength: i32,

    #[serde(default = "default_source")]
    pub source: ObservationSource,

    /// Defaults to the time the request is received.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

fn default_source() -> ObservationSource {
    ObservationSource::Live
}

impl ObservationPayload {
    /// Converts into a domain observation, stamping `received_at` when the
    /// client did not send a capture time.
    pub fn into_observation(self, received_at: DateTime<Utc>) -> ProximityObservation {
        ProximityObservation {
            beacon_id: self.beacon_id,
            signal_strength: self.signal_strength,
            source: self.source,
            captured_at: self.captured_at.unwrap_or(received_at),
        }
    }
}

impl From<ProximityObservation> for ObservationPayload {
    fn from(obs: ProximityObservation) -> Self {
        Self {
            beacon_id: obs.beacon_id,
            signal_strength: obs.signal_strength,
            source: obs.source,
            captured_at: Some(obs.captured_at),
        }
    }
}
