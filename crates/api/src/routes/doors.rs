//! Door endpoint handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::{DoorResponse, ListDoorsResponse};
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// Doors the caller may see.
///
/// GET /api/v1/doors
pub async fn list_doors(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> Result<Json<ListDoorsResponse>, ApiError> {
    let doors = state.registry.list_accessible_doors(auth.user_id).await?;
    debug!(user_id = %auth.user_id, count = doors.len(), "Listed doors");

    let doors: Vec<DoorResponse> = doors.into_iter().map(DoorResponse::from).collect();
    Ok(Json(ListDoorsResponse {
        total: doors.len(),
        doors,
    }))
}

/// GET /api/v1/doors/:door_id
pub async fn get_door(
    State(state): State<AppState>,
    CurrentUser(_auth): CurrentUser,
    Path(door_id): Path<Uuid>,
) -> Result<Json<DoorResponse>, ApiError> {
    let door = state
        .registry
        .get(door_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Door not found".to_string()))?;

    Ok(Json(door.into()))
}
