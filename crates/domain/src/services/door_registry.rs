//! Read-mostly cache of door records.
//!
//! Entries expire after a short TTL so that an online/offline change made by a
//! door heartbeat is picked up quickly. A background job calls
//! [`DoorRegistry::refresh`] to reload everything periodically.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::collaborators::{CollaboratorError, DoorProvisioning};
use crate::models::Door;

#[derive(Debug, Clone)]
struct CachedDoor {
    door: Door,
    fetched_at: Instant,
}

/// Door catalog backed by the provisioning collaborator.
pub struct DoorRegistry {
    provisioning: Arc<dyn DoorProvisioning>,
    ttl: Duration,
    cache: RwLock<HashMap<Uuid, CachedDoor>>,
}

impl DoorRegistry {
    pub fn new(provisioning: Arc<dyn DoorProvisioning>, ttl: Duration) -> Self {
        Self {
            provisioning,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a door, serving from cache while the entry is fresh.
    pub async fn get(&self, door_id: Uuid) -> Result<Option<Door>, CollaboratorError> {
        if let Some(door) = self.cached(door_id) {
            return Ok(Some(door));
        }

        self.get_fresh(door_id).await
    }

    /// Look up a door straight from provisioning and update the cache.
    ///
    /// Access decisions use this so a door marked offline is never actuated
    /// from a stale entry.
    pub async fn get_fresh(&self, door_id: Uuid) -> Result<Option<Door>, CollaboratorError> {
        let fetched = self.provisioning.get(door_id).await?;
        match &fetched {
            Some(door) => self.store(door.clone()),
            None => {
                self.invalidate(door_id);
                debug!(door_id = %door_id, "Door not found in provisioning");
            }
        }
        Ok(fetched)
    }

    /// Doors visible to the user. Delegated to provisioning; results also warm the cache.
    pub async fn list_accessible_doors(&self, user_id: Uuid) -> Result<Vec<Door>, CollaboratorError> {
        let doors = self.provisioning.list_accessible_doors(user_id).await?;
        for door in &doors {
            self.store(door.clone());
        }
        Ok(doors)
    }

    /// Replace the whole cache with a fresh listing. Returns the door count.
    pub async fn refresh(&self) -> Result<usize, CollaboratorError> {
        let doors = self.provisioning.list_all().await?;
        let now = Instant::now();
        let fresh: HashMap<Uuid, CachedDoor> = doors
            .into_iter()
            .map(|door| {
                (
                    door.id,
                    CachedDoor {
                        door,
                        fetched_at: now,
                    },
                )
            })
            .collect();
        let count = fresh.len();

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        info!(doors = count, "Door registry refreshed");
        Ok(count)
    }

    pub fn invalidate(&self, door_id: Uuid) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&door_id);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn cached(&self, door_id: Uuid) -> Option<Door> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&door_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.door.clone())
    }

    fn store(&self, door: Door) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            door.id,
            CachedDoor {
                door,
                fetched_at: Instant::now(),
            },
        );
    }
}
