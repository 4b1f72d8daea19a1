//! Unlock history handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use domain::models::{ListUnlockAttemptsQuery, ListUnlockAttemptsResponse, UnlockAttemptItem};
use shared::pagination::{decode_cursor, encode_cursor};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

const MAX_PAGE_SIZE: i64 = 100;

/// The caller's own unlock attempts, newest first.
///
/// GET /api/v1/unlock-attempts?cursor=<opaque>&limit=<1-100>
pub async fn list_unlock_attempts(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Query(query): Query<ListUnlockAttemptsQuery>,
) -> Result<Json<ListUnlockAttemptsResponse>, ApiError> {
    if !(1..=MAX_PAGE_SIZE).contains(&query.limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let before = query.cursor.as_deref().map(decode_cursor).transpose()?;

    // One extra row tells us whether another page exists.
    let mut attempts = state
        .attempts
        .list_for_user(auth.user_id, before, query.limit + 1)
        .await?;

    let next_cursor = if attempts.len() as i64 > query.limit {
        attempts.truncate(query.limit as usize);
        attempts
            .last()
            .map(|last| encode_cursor(last.requested_at, last.id))
    } else {
        None
    };

    Ok(Json(ListUnlockAttemptsResponse {
        data: attempts.into_iter().map(UnlockAttemptItem::from).collect(),
        next_cursor,
    }))
}
