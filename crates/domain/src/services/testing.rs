//! In-memory collaborators for development and testing.
//!
//! These log what they would do and keep counters so tests can assert on
//! call patterns.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::collaborators::{
    ActuatorAck, ActuatorChannel, Clock, CollaboratorError, DoorProvisioning,
    MembershipValidator, StoreError, UnlockAttemptStore,
};
use crate::models::{
    ActuationDisposition, ActuationResult, Door, DoorOnlineStatus, MembershipStatus,
    ProximityPolicy, UnlockAttempt,
};

/// An online door with the given policy.
pub fn sample_door(policy: Option<ProximityPolicy>) -> Door {
    Door {
        id: Uuid::new_v4(),
        name: "Studio A".to_string(),
        location: Some("First floor".to_string()),
        online_status: DoorOnlineStatus::Online,
        proximity_policy: policy,
        updated_at: Utc::now(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Door provisioning backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryDoorProvisioning {
    doors: Mutex<HashMap<Uuid, Door>>,
    grants: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    get_calls: AtomicUsize,
    unreachable: AtomicBool,
}

impl InMemoryDoorProvisioning {
    pub fn with_doors(doors: Vec<Door>) -> Self {
        let provisioning = Self::default();
        for door in doors {
            provisioning.insert(door);
        }
        provisioning
    }

    pub fn insert(&self, door: Door) {
        lock(&self.doors).insert(door.id, door);
    }

    pub fn remove(&self, door_id: Uuid) {
        lock(&self.doors).remove(&door_id);
    }

    pub fn set_status(&self, door_id: Uuid, status: DoorOnlineStatus) {
        if let Some(door) = lock(&self.doors).get_mut(&door_id) {
            door.online_status = status;
            door.updated_at = Utc::now();
        }
    }

    /// Make a door visible to a user.
    pub fn grant(&self, user_id: Uuid, door_id: Uuid) {
        lock(&self.grants).entry(user_id).or_default().insert(door_id);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), CollaboratorError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(CollaboratorError::unreachable(
                "door_provisioning",
                "simulated outage",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DoorProvisioning for InMemoryDoorProvisioning {
    async fn get(&self, door_id: Uuid) -> Result<Option<Door>, CollaboratorError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(lock(&self.doors).get(&door_id).cloned())
    }

    async fn list_accessible_doors(&self, user_id: Uuid) -> Result<Vec<Door>, CollaboratorError> {
        self.check_reachable()?;
        let grants = lock(&self.grants);
        let doors = lock(&self.doors);
        let mut visible: Vec<Door> = grants
            .get(&user_id)
            .map(|ids| ids.iter().filter_map(|id| doors.get(id).cloned()).collect())
            .unwrap_or_default();
        visible.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(visible)
    }

    async fn list_all(&self) -> Result<Vec<Door>, CollaboratorError> {
        self.check_reachable()?;
        Ok(lock(&self.doors).values().cloned().collect())
    }
}

/// Membership validator with a default answer and per-user overrides.
#[derive(Debug)]
pub struct StaticMembershipValidator {
    default_status: MembershipStatus,
    overrides: Mutex<HashMap<Uuid, MembershipStatus>>,
    calls: AtomicUsize,
    failures_remaining: AtomicU32,
}

impl StaticMembershipValidator {
    pub fn new(default_status: MembershipStatus) -> Self {
        Self {
            default_status,
            overrides: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
        }
    }

    /// Everyone has an active membership.
    pub fn all_active() -> Self {
        Self::new(MembershipStatus::active("Standard", None))
    }

    pub fn set_status(&self, user_id: Uuid, status: MembershipStatus) {
        lock(&self.overrides).insert(user_id, status);
    }

    /// The next `n` calls fail as unreachable.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MembershipValidator for StaticMembershipValidator {
    async fn get_status(&self, user_id: Uuid) -> Result<MembershipStatus, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::unreachable(
                "membership",
                "simulated outage",
            ));
        }

        Ok(lock(&self.overrides)
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| self.default_status.clone()))
    }
}

/// How the mock actuator responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorBehavior {
    Acknowledge,
    /// Never answers; callers hit their timeout.
    Hang,
    Unreachable,
}

/// Actuator that logs unlocks instead of driving a lock.
///
/// Honors the idempotency contract: a repeated attempt id is acknowledged
/// without a second actuation.
#[derive(Debug)]
pub struct MockActuatorChannel {
    behavior: Mutex<ActuatorBehavior>,
    dispatch_calls: AtomicUsize,
    actuated: Mutex<Vec<(Uuid, Uuid)>>,
}

impl Default for MockActuatorChannel {
    fn default() -> Self {
        Self::new(ActuatorBehavior::Acknowledge)
    }
}

impl MockActuatorChannel {
    pub fn new(behavior: ActuatorBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            dispatch_calls: AtomicUsize::new(0),
            actuated: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: ActuatorBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Number of times `dispatch_unlock` was called, including retries.
    pub fn dispatch_calls(&self) -> usize {
        self.dispatch_calls.load(Ordering::SeqCst)
    }

    /// Number of physical actuations performed.
    pub fn actuation_count(&self) -> usize {
        lock(&self.actuated).len()
    }

    pub fn actuations(&self) -> Vec<(Uuid, Uuid)> {
        lock(&self.actuated).clone()
    }
}

#[async_trait::async_trait]
impl ActuatorChannel for MockActuatorChannel {
    async fn dispatch_unlock(
        &self,
        door_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<ActuatorAck, CollaboratorError> {
        self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *lock(&self.behavior);

        match behavior {
            ActuatorBehavior::Unreachable => {
                tracing::warn!(door_id = %door_id, "Mock actuator simulating outage");
                return Err(CollaboratorError::unreachable("actuator", "simulated outage"));
            }
            ActuatorBehavior::Hang => {
                std::future::pending::<()>().await;
            }
            ActuatorBehavior::Acknowledge => {}
        }

        {
            let mut actuated = lock(&self.actuated);
            if actuated.iter().any(|(_, seen)| *seen == attempt_id) {
                tracing::info!(attempt_id = %attempt_id, "Mock: duplicate dispatch acknowledged");
            } else {
                actuated.push((door_id, attempt_id));
                tracing::info!(
                    door_id = %door_id,
                    attempt_id = %attempt_id,
                    "Mock: would unlock door"
                );
            }
        }

        Ok(ActuatorAck {
            door_id,
            attempt_id,
            acknowledged_at: Utc::now(),
        })
    }
}

/// Unlock attempt store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryUnlockAttemptStore {
    attempts: Mutex<Vec<UnlockAttempt>>,
    results: Mutex<HashMap<Uuid, ActuationResult>>,
    fail_writes: AtomicBool,
}

impl InMemoryUnlockAttemptStore {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<UnlockAttempt> {
        lock(&self.attempts).clone()
    }

    pub fn result_for(&self, attempt_id: Uuid) -> Option<ActuationResult> {
        lock(&self.results).get(&attempt_id).copied()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError("simulated write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl UnlockAttemptStore for InMemoryUnlockAttemptStore {
    async fn record_attempt(&self, attempt: &UnlockAttempt) -> Result<(), StoreError> {
        self.check_writable()?;
        lock(&self.attempts).push(attempt.clone());
        Ok(())
    }

    async fn last_dispatched_at(&self, door_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        let results = lock(&self.results);
        Ok(lock(&self.attempts)
            .iter()
            .filter(|a| a.door_id == door_id && a.actuation == ActuationDisposition::Dispatched)
            .filter(|a| results.get(&a.id) != Some(&ActuationResult::Unavailable))
            .map(|a| a.requested_at)
            .max())
    }

    async fn record_actuation_result(
        &self,
        attempt_id: Uuid,
        result: ActuationResult,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        lock(&self.results).insert(attempt_id, result);
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UnlockAttempt>, StoreError> {
        let mut attempts: Vec<UnlockAttempt> = lock(&self.attempts)
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| match before {
                Some((at, id)) => (a.requested_at, a.id) < (at, id),
                None => true,
            })
            .cloned()
            .collect();
        attempts.sort_by(|a, b| (b.requested_at, b.id).cmp(&(a.requested_at, a.id)));
        attempts.truncate(limit.max(0) as usize);
        Ok(attempts)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
