//! Unlock attempt repository for database operations.
//!
//! Attempts are insert-only. Actuator outcomes go to `unlock_actuations`.

use chrono::{DateTime, Utc};
use domain::models::{ActuationResult, UnlockAttempt};
use domain::services::{StoreError, UnlockAttemptStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{
    ActuationDispositionDb, ActuationResultDb, ObservationSourceDb, UnlockAttemptEntity,
    UnlockDecisionDb,
};
use crate::metrics::QueryTimer;

/// Repository for unlock attempt database operations.
#[derive(Clone)]
pub struct UnlockAttemptRepository {
    pool: PgPool,
}

impl UnlockAttemptRepository {
    /// Creates a new UnlockAttemptRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, attempt: &UnlockAttempt) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_unlock_attempt");
        let evidence = attempt.proximity_evidence.as_ref();
        let result = sqlx::query(
            r#"
            INSERT INTO unlock_attempts (
                id, user_id, door_id, requested_at, decision, deny_reason,
                evidence_beacon_id, evidence_signal_strength, evidence_source,
                evidence_captured_at, test_mode, actuation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.door_id)
        .bind(attempt.requested_at)
        .bind(UnlockDecisionDb::from(attempt.decision))
        .bind(attempt.deny_reason.map(|r| r.as_str()))
        .bind(evidence.map(|e| e.beacon_id.as_str()))
        .bind(evidence.map(|e| e.signal_strength))
        .bind(evidence.map(|e| ObservationSourceDb::from(e.source)))
        .bind(evidence.map(|e| e.captured_at))
        .bind(attempt.test_mode)
        .bind(ActuationDispositionDb::from(attempt.actuation))
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Latest dispatched attempt for a door whose unlock was not reported
    /// undeliverable.
    pub async fn find_last_dispatched_at(
        &self,
        door_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let timer = QueryTimer::new("find_last_dispatched_unlock");
        let result = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT MAX(a.requested_at)
            FROM unlock_attempts a
            WHERE a.door_id = $1
              AND a.actuation = 'dispatched'
              AND NOT EXISTS (
                  SELECT 1 FROM unlock_actuations r
                  WHERE r.attempt_id = a.id AND r.result = 'unavailable'
              )
            "#,
        )
        .bind(door_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn insert_actuation_result(
        &self,
        attempt_id: Uuid,
        result: ActuationResult,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_unlock_actuation");
        let outcome = sqlx::query(
            r#"
            INSERT INTO unlock_actuations (attempt_id, result)
            VALUES ($1, $2)
            "#,
        )
        .bind(attempt_id)
        .bind(ActuationResultDb::from(result))
        .execute(&self.pool)
        .await;
        timer.record();
        outcome.map(|_| ())
    }

    /// Keyset-paginated attempts for a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UnlockAttemptEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_unlock_attempts_for_user");
        let (before_at, before_id) = before.unzip();
        let result = sqlx::query_as::<_, UnlockAttemptEntity>(
            r#"
            SELECT id, user_id, door_id, requested_at, decision, deny_reason,
                   evidence_beacon_id, evidence_signal_strength, evidence_source,
                   evidence_captured_at, test_mode, actuation
            FROM unlock_attempts
            WHERE user_id = $1
              AND ($2::timestamptz IS NULL OR (requested_at, id) < ($2, $3))
            ORDER BY requested_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(before_at)
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    StoreError(err.to_string())
}

#[async_trait::async_trait]
impl UnlockAttemptStore for UnlockAttemptRepository {
    async fn record_attempt(&self, attempt: &UnlockAttempt) -> Result<(), StoreError> {
        self.insert(attempt).await.map_err(store_error)
    }

    async fn last_dispatched_at(&self, door_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.find_last_dispatched_at(door_id)
            .await
            .map_err(store_error)
    }

    async fn record_actuation_result(
        &self,
        attempt_id: Uuid,
        result: ActuationResult,
    ) -> Result<(), StoreError> {
        self.insert_actuation_result(attempt_id, result)
            .await
            .map_err(store_error)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UnlockAttempt>, StoreError> {
        let rows = UnlockAttemptRepository::list_for_user(self, user_id, before, limit)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(UnlockAttempt::from).collect())
    }
}
