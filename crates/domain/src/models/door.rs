//! Door domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Connectivity of a door controller, as last reported by its heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorOnlineStatus {
    Online,
    Offline,
}

impl FromStr for DoorOnlineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(DoorOnlineStatus::Online),
            "offline" => Ok(DoorOnlineStatus::Offline),
            _ => Err(format!("Unknown door status: {}", s)),
        }
    }
}

impl std::fmt::Display for DoorOnlineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoorOnlineStatus::Online => write!(f, "online"),
            DoorOnlineStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Proximity evidence a door demands before it may be unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProximityPolicy {
    /// Identifier of the beacon mounted at the door.
    pub beacon_id: String,
    /// Weakest acceptable RSSI in dBm; readings below this are too far away.
    pub minimum_signal_strength: i32,
}

/// A physical door with an unlockable actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Door {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub online_status: DoorOnlineStatus,
    /// `None` means the door does not require proximity evidence.
    pub proximity_policy: Option<ProximityPolicy>,
    pub updated_at: DateTime<Utc>,
}

impl Door {
    pub fn is_online(&self) -> bool {
        self.online_status == DoorOnlineStatus::Online
    }

    pub fn requires_proximity(&self) -> bool {
        self.proximity_policy.is_some()
    }
}

/// Door as presented to members.
///
/// The minimum signal strength is deliberately left out; clients only need
/// to know which beacon to scan for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DoorResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub online_status: DoorOnlineStatus,
    pub requires_proximity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beacon_id: Option<String>,
}

impl From<Door> for DoorResponse {
    fn from(door: Door) -> Self {
        Self {
            id: door.id,
            requires_proximity: door.requires_proximity(),
            beacon_id: door.proximity_policy.map(|p| p.beacon_id),
            name: door.name,
            location: door.location,
            online_status: door.online_status,
        }
    }
}

/// Response for listing doors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListDoorsResponse {
    pub doors: Vec<DoorResponse>,
    pub total: usize,
}
