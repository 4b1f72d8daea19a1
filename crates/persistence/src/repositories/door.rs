//! Door repository for database operations.

use domain::models::Door;
use domain::services::{CollaboratorError, DoorProvisioning};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::DoorEntity;
use crate::metrics::QueryTimer;

const SERVICE: &str = "door_provisioning";

/// Repository for door-related database operations.
#[derive(Clone)]
pub struct DoorRepository {
    pool: PgPool,
}

impl DoorRepository {
    /// Creates a new DoorRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a door by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DoorEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_door_by_id");
        let result = sqlx::query_as::<_, DoorEntity>(
            r#"
            SELECT id, name, location, online_status, beacon_id, min_signal_strength, updated_at
            FROM doors
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Doors the user has been granted visibility of, ordered by name.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<DoorEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_doors_for_user");
        let result = sqlx::query_as::<_, DoorEntity>(
            r#"
            SELECT d.id, d.name, d.location, d.online_status, d.beacon_id,
                   d.min_signal_strength, d.updated_at
            FROM doors d
            JOIN door_user_access a ON a.door_id = d.id
            WHERE a.user_id = $1
            ORDER BY d.name, d.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list_all(&self) -> Result<Vec<DoorEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_all_doors");
        let result = sqlx::query_as::<_, DoorEntity>(
            r#"
            SELECT id, name, location, online_status, beacon_id, min_signal_strength, updated_at
            FROM doors
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

fn unreachable(err: sqlx::Error) -> CollaboratorError {
    CollaboratorError::unreachable(SERVICE, err.to_string())
}

#[async_trait::async_trait]
impl DoorProvisioning for DoorRepository {
    async fn get(&self, door_id: Uuid) -> Result<Option<Door>, CollaboratorError> {
        Ok(self
            .find_by_id(door_id)
            .await
            .map_err(unreachable)?
            .map(Door::from))
    }

    async fn list_accessible_doors(&self, user_id: Uuid) -> Result<Vec<Door>, CollaboratorError> {
        let doors = self.list_for_user(user_id).await.map_err(unreachable)?;
        Ok(doors.into_iter().map(Door::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<Door>, CollaboratorError> {
        let doors = DoorRepository::list_all(self).await.map_err(unreachable)?;
        Ok(doors.into_iter().map(Door::from).collect())
    }
}
