//! Periodic reload of the door registry cache.

use std::sync::Arc;
use std::time::Duration;

use domain::services::DoorRegistry;

use super::scheduler::Job;
use crate::middleware::metrics::record_registry_size;

/// Replaces the cached door set with a fresh copy from provisioning.
///
/// Keeps door status changes visible within one interval even for doors no
/// one has asked about recently.
pub struct DoorRegistryRefreshJob {
    registry: Arc<DoorRegistry>,
    interval: Duration,
}

impl DoorRegistryRefreshJob {
    pub fn new(registry: Arc<DoorRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }
}

#[async_trait::async_trait]
impl Job for DoorRegistryRefreshJob {
    fn name(&self) -> &'static str {
        "door_registry_refresh"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let count = self.registry.refresh().await?;
        record_registry_size(count);
        Ok(())
    }
}
