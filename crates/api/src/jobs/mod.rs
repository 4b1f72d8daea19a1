//! Background job scheduler and job implementations.

mod door_registry_refresh;
mod pool_metrics;
mod scheduler;

pub use door_registry_refresh::DoorRegistryRefreshJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobScheduler};
