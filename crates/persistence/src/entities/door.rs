//! Door entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Door, DoorOnlineStatus, ProximityPolicy};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for door connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "door_status", rename_all = "lowercase")]
pub enum DoorStatusDb {
    Online,
    Offline,
}

impl From<DoorStatusDb> for DoorOnlineStatus {
    fn from(status: DoorStatusDb) -> Self {
        match status {
            DoorStatusDb::Online => DoorOnlineStatus::Online,
            DoorStatusDb::Offline => DoorOnlineStatus::Offline,
        }
    }
}

/// Database row mapping for the doors table.
#[derive(Debug, Clone, FromRow)]
pub struct DoorEntity {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub online_status: DoorStatusDb,
    pub beacon_id: Option<String>,
    pub min_signal_strength: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl From<DoorEntity> for Door {
    fn from(entity: DoorEntity) -> Self {
        let proximity_policy = match (entity.beacon_id, entity.min_signal_strength) {
            (Some(beacon_id), Some(minimum_signal_strength)) => Some(ProximityPolicy {
                beacon_id,
                minimum_signal_strength,
            }),
            _ => None,
        };

        Self {
            id: entity.id,
            name: entity.name,
            location: entity.location,
            online_status: entity.online_status.into(),
            proximity_policy,
            updated_at: entity.updated_at,
        }
    }
}
