//! Door controller gateway client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::services::{ActuatorAck, ActuatorChannel, CollaboratorError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::http::{map_status, map_transport_error};
use crate::config::ActuatorConfig;

const SERVICE: &str = "actuator";

/// Header the gateway deduplicates on.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Serialize)]
struct UnlockCommand {
    attempt_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct UnlockAck {
    #[serde(default)]
    acknowledged_at: Option<DateTime<Utc>>,
}

/// Sends unlock commands to the gateway in front of the door controllers.
///
/// `POST {base_url}/doors/{door_id}/unlock` with the attempt id as the
/// idempotency key, so a retried delivery never opens the door twice.
pub struct HttpActuatorChannel {
    http: Client,
    base_url: String,
}

impl HttpActuatorChannel {
    pub fn new(config: &ActuatorConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ActuatorChannel for HttpActuatorChannel {
    async fn dispatch_unlock(
        &self,
        door_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<ActuatorAck, CollaboratorError> {
        let response = self
            .http
            .post(format!("{}/doors/{}/unlock", self.base_url, door_id))
            .header(IDEMPOTENCY_KEY_HEADER, attempt_id.to_string())
            .json(&UnlockCommand { attempt_id })
            .send()
            .await
            .map_err(|e| map_transport_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(SERVICE, status, body));
        }

        // An empty or unparseable body still means the gateway accepted it.
        let acknowledged_at = response
            .json::<UnlockAck>()
            .await
            .ok()
            .and_then(|ack| ack.acknowledged_at)
            .unwrap_or_else(Utc::now);

        debug!(door_id = %door_id, attempt_id = %attempt_id, "Actuator acknowledged");
        Ok(ActuatorAck {
            door_id,
            attempt_id,
            acknowledged_at,
        })
    }
}

/// Logs unlock commands instead of driving hardware.
///
/// Selected with `actuator.provider = "mock"` for local development.
pub struct ConsoleActuatorChannel;

#[async_trait]
impl ActuatorChannel for ConsoleActuatorChannel {
    async fn dispatch_unlock(
        &self,
        door_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<ActuatorAck, CollaboratorError> {
        info!(
            door_id = %door_id,
            attempt_id = %attempt_id,
            "Unlock command (console provider): door would unlock"
        );
        Ok(ActuatorAck {
            door_id,
            attempt_id,
            acknowledged_at: Utc::now(),
        })
    }
}
