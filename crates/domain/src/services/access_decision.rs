//! Access decision engine.
//!
//! Decides whether a member may unlock a door and, on ALLOW, drives the
//! door's actuator. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. the door exists
//! 2. the door is online
//! 3. the member has an active membership
//! 4. proximity evidence satisfies the door's policy, if it has one
//!
//! Every call is recorded as an [`UnlockAttempt`], including denials.
//! Attempts for the same door are serialized so the cooldown check and the
//! dispatch decision see a consistent history. The door is always read
//! fresh from provisioning, never from the registry cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use shared::retry::{retry_with_backoff, RetryPolicy};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::collaborators::{
    ActuatorChannel, Clock, CollaboratorError, MembershipValidator, StoreError, SystemClock,
    UnlockAttemptStore,
};
use super::door_registry::DoorRegistry;
use crate::models::{
    ActuationDisposition, ActuationResult, ActuationStatus, DenyReason, ProximityObservation,
    ProximityPolicy, UnlockAttempt, UnlockOutcome,
};

/// Errors that are not access decisions.
///
/// A DENY is returned as an [`UnlockOutcome`]; these are reserved for bad
/// input and infrastructure faults.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Invalid unlock request: {0}")]
    InvalidRequest(String),

    #[error("Dependency unavailable: {0}")]
    Unavailable(#[from] CollaboratorError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Tunables for [`AccessDecisionEngine`].
#[derive(Debug, Clone)]
pub struct AccessPolicyConfig {
    /// Window after a dispatched unlock during which further ALLOWs for the
    /// same door do not actuate again.
    pub cooldown: Duration,
    /// How long to wait for one actuator acknowledgement.
    pub actuator_timeout: Duration,
    /// Retries for door and membership lookups.
    pub lookup_retry: RetryPolicy,
    /// Retries for actuator dispatch when the channel is unreachable.
    pub actuator_retry: RetryPolicy,
}

impl Default for AccessPolicyConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            actuator_timeout: Duration::from_secs(3),
            lookup_retry: RetryPolicy::default(),
            actuator_retry: RetryPolicy::default(),
        }
    }
}

/// Caller-supplied options for one unlock attempt.
#[derive(Debug, Clone, Default)]
pub struct UnlockOptions {
    /// Explicit test-mode bypass of the signal-strength check. Never inferred.
    pub test_mode: bool,
    pub observation: Option<ProximityObservation>,
    /// Builds a simulated observation; only accepted with `test_mode`.
    pub simulated_beacon_id: Option<String>,
}

impl UnlockOptions {
    pub fn live(observation: ProximityObservation) -> Self {
        Self {
            test_mode: false,
            observation: Some(observation),
            simulated_beacon_id: None,
        }
    }

    pub fn simulated(beacon_id: impl Into<String>) -> Self {
        Self {
            test_mode: true,
            observation: None,
            simulated_beacon_id: Some(beacon_id.into()),
        }
    }

    fn into_evidence(self) -> Result<(bool, Option<ProximityObservation>), AccessError> {
        match (self.observation, self.simulated_beacon_id) {
            (Some(_), Some(_)) => Err(AccessError::InvalidRequest(
                "observation and simulated_beacon_id are mutually exclusive".to_string(),
            )),
            (None, Some(_)) if !self.test_mode => Err(AccessError::InvalidRequest(
                "simulated_beacon_id requires test_mode".to_string(),
            )),
            (None, Some(beacon_id)) => Ok((true, Some(ProximityObservation::simulated(beacon_id)))),
            (observation, None) => Ok((self.test_mode, observation)),
        }
    }
}

/// Checks proximity evidence against a door's policy.
///
/// In test mode only the beacon id must match; the reported strength is not
/// trusted and is never compared.
pub fn evaluate_proximity(
    policy: Option<&ProximityPolicy>,
    observation: Option<&ProximityObservation>,
    test_mode: bool,
) -> Result<(), DenyReason> {
    let Some(policy) = policy else {
        return Ok(());
    };
    let observation = observation.ok_or(DenyReason::ProximityRequired)?;

    if observation.beacon_id != policy.beacon_id {
        return Err(DenyReason::BeaconMismatch);
    }
    if !test_mode && observation.signal_strength < policy.minimum_signal_strength {
        return Err(DenyReason::ProximityTooWeak);
    }
    Ok(())
}

/// Server-side unlock decisions for all doors.
pub struct AccessDecisionEngine {
    registry: Arc<DoorRegistry>,
    membership: Arc<dyn MembershipValidator>,
    actuator: Arc<dyn ActuatorChannel>,
    store: Arc<dyn UnlockAttemptStore>,
    clock: Arc<dyn Clock>,
    config: AccessPolicyConfig,
    // Only doors with an attempt in progress have an entry.
    door_locks: DoorLocks,
}

impl AccessDecisionEngine {
    pub fn new(
        registry: Arc<DoorRegistry>,
        membership: Arc<dyn MembershipValidator>,
        actuator: Arc<dyn ActuatorChannel>,
        store: Arc<dyn UnlockAttemptStore>,
        config: AccessPolicyConfig,
    ) -> Self {
        Self {
            registry,
            membership,
            actuator,
            store,
            clock: Arc::new(SystemClock),
            config,
            door_locks: DoorLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AccessPolicyConfig {
        &self.config
    }

    /// Decide and, on ALLOW, actuate.
    ///
    /// Returns `Ok` for every ALLOW and DENY. `Err` means the decision could
    /// not be made or the door could not be reached.
    #[instrument(skip(self, options), fields(test_mode = options.test_mode))]
    pub async fn attempt_unlock(
        &self,
        user_id: Uuid,
        door_id: Uuid,
        options: UnlockOptions,
    ) -> Result<UnlockOutcome, AccessError> {
        let (test_mode, evidence) = options.into_evidence()?;

        let guard = self.door_locks.acquire(door_id).await;

        let requested_at = self.clock.now();

        let door = retry_with_backoff(
            &self.config.lookup_retry,
            "door_lookup",
            CollaboratorError::is_retryable,
            || self.registry.get_fresh(door_id),
        )
        .await?;

        let Some(door) = door else {
            return self
                .deny(user_id, door_id, requested_at, DenyReason::DoorNotFound, evidence, test_mode)
                .await;
        };

        if !door.is_online() {
            return self
                .deny(user_id, door_id, requested_at, DenyReason::DoorOffline, evidence, test_mode)
                .await;
        }

        let membership = retry_with_backoff(
            &self.config.lookup_retry,
            "membership_lookup",
            CollaboratorError::is_retryable,
            || self.membership.get_status(user_id),
        )
        .await?;

        if !membership.has_active_membership {
            return self
                .deny(
                    user_id,
                    door_id,
                    requested_at,
                    DenyReason::NoActiveMembership,
                    evidence,
                    test_mode,
                )
                .await;
        }

        if let Err(reason) =
            evaluate_proximity(door.proximity_policy.as_ref(), evidence.as_ref(), test_mode)
        {
            return self
                .deny(user_id, door_id, requested_at, reason, evidence, test_mode)
                .await;
        }

        let in_cooldown = match self.store.last_dispatched_at(door_id).await? {
            Some(last) => (requested_at - last)
                .to_std()
                .map(|elapsed| elapsed < self.config.cooldown)
                .unwrap_or(true),
            None => false,
        };

        let disposition = if in_cooldown {
            ActuationDisposition::Suppressed
        } else {
            ActuationDisposition::Dispatched
        };
        let attempt = UnlockAttempt::allowed(
            user_id,
            door_id,
            requested_at,
            evidence,
            test_mode,
            disposition,
        );
        self.store.record_attempt(&attempt).await?;
        drop(guard);

        if test_mode {
            info!(
                attempt_id = %attempt.id,
                user_id = %user_id,
                door_id = %door_id,
                "Test-mode unlock allowed without signal strength check"
            );
        }

        if in_cooldown {
            info!(
                attempt_id = %attempt.id,
                door_id = %door_id,
                "Unlock allowed inside cooldown, actuation suppressed"
            );
            return Ok(UnlockOutcome::allowed(attempt.id, ActuationStatus::Suppressed));
        }

        let status = self.dispatch(door_id, attempt.id).await?;
        Ok(UnlockOutcome::allowed(attempt.id, status))
    }

    async fn deny(
        &self,
        user_id: Uuid,
        door_id: Uuid,
        requested_at: chrono::DateTime<chrono::Utc>,
        reason: DenyReason,
        evidence: Option<ProximityObservation>,
        test_mode: bool,
    ) -> Result<UnlockOutcome, AccessError> {
        let attempt =
            UnlockAttempt::denied(user_id, door_id, requested_at, reason, evidence, test_mode);
        self.store.record_attempt(&attempt).await?;

        info!(
            attempt_id = %attempt.id,
            user_id = %user_id,
            door_id = %door_id,
            deny_reason = %reason,
            "Unlock denied"
        );
        Ok(UnlockOutcome::denied(attempt.id, reason))
    }

    /// Sends the unlock command. The attempt id is the idempotency key, so
    /// retrying after an unreachable channel cannot actuate twice.
    async fn dispatch(&self, door_id: Uuid, attempt_id: Uuid) -> Result<ActuationStatus, AccessError> {
        let timeout = self.config.actuator_timeout;
        let result = retry_with_backoff(
            &self.config.actuator_retry,
            "actuator_dispatch",
            |e: &CollaboratorError| matches!(e, CollaboratorError::Unreachable { .. }),
            || async move {
                match tokio::time::timeout(timeout, self.actuator.dispatch_unlock(door_id, attempt_id))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CollaboratorError::Timeout { service: "actuator" }),
                }
            },
        )
        .await;

        let (recorded, outcome) = match result {
            Ok(ack) => {
                info!(
                    attempt_id = %attempt_id,
                    door_id = %door_id,
                    acknowledged_at = %ack.acknowledged_at,
                    "Unlock acknowledged by actuator"
                );
                (ActuationResult::Acknowledged, Ok(ActuationStatus::Confirmed))
            }
            Err(CollaboratorError::Timeout { .. }) => {
                warn!(
                    attempt_id = %attempt_id,
                    door_id = %door_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Actuator did not acknowledge in time, actuation unknown"
                );
                (ActuationResult::TimedOut, Ok(ActuationStatus::Unknown))
            }
            Err(e) => {
                warn!(
                    attempt_id = %attempt_id,
                    door_id = %door_id,
                    error = %e,
                    "Actuator unavailable"
                );
                (ActuationResult::Unavailable, Err(AccessError::Unavailable(e)))
            }
        };

        if let Err(e) = self.store.record_actuation_result(attempt_id, recorded).await {
            warn!(
                attempt_id = %attempt_id,
                result = %recorded,
                error = %e,
                "Failed to record actuation result"
            );
        }

        outcome
    }

}

type LockMap = Arc<std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Per-door async mutexes. An entry is removed when its last holder or
/// waiter lets go, so unknown door ids leave nothing behind.
#[derive(Default)]
struct DoorLocks {
    locks: LockMap,
}

impl DoorLocks {
    async fn acquire(&self, door_id: Uuid) -> DoorLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(door_id).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        DoorLockGuard {
            locks: Arc::clone(&self.locks),
            door_id,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct DoorLockGuard {
    locks: LockMap,
    door_id: Uuid,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DoorLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this guard are the only owners left: nobody is waiting.
        let idle = locks
            .get(&self.door_id)
            .is_some_and(|held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(&self.lock) == 2);
        if idle {
            locks.remove(&self.door_id);
        }
    }
}
