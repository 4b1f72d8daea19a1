//! HTTP client for the door access API.
//!
//! [`UnlockClient::unlock_door`] runs the whole member-side flow: look up the
//! door, gather proximity evidence if the door asks for it, submit the
//! unlock request.

use std::time::Duration;

use domain::models::{
    DoorResponse, ListDoorsResponse, ObservationPayload, UnlockOutcome, UnlockRequest,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::observation::{ObservationError, ObservationProvider};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("Server returned {status}: {message}")]
    Api {
        status: StatusCode,
        error: String,
        message: String,
    },

    #[error(transparent)]
    Observation(#[from] ObservationError),
}

impl ClientError {
    /// The door service or one of its dependencies is down; the request can
    /// be retried later. This is never an access denial.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

pub struct UnlockClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl UnlockClient {
    pub fn new(config: &ClientConfig, access_token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(&config.server_url, config.request_timeout(), access_token)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        access_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    pub async fn list_doors(&self) -> Result<ListDoorsResponse, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/doors", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        parse(response).await
    }

    pub async fn get_door(&self, door_id: Uuid) -> Result<DoorResponse, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/doors/{}", self.base_url, door_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        parse(response).await
    }

    pub async fn attempt_unlock(
        &self,
        door_id: Uuid,
        request: &UnlockRequest,
    ) -> Result<UnlockOutcome, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/v1/doors/{}/unlock", self.base_url, door_id))
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await?;
        parse(response).await
    }

    /// Look up the door, produce evidence when required, then ask to unlock.
    ///
    /// In test mode the beacon id is sent as `simulated_beacon_id` and the
    /// radio is never used.
    pub async fn unlock_door(
        &self,
        provider: &ObservationProvider,
        door_id: Uuid,
        test_mode: bool,
        cancel: &CancellationToken,
    ) -> Result<UnlockOutcome, ClientError> {
        let door = self.get_door(door_id).await?;

        let request = match door.beacon_id.filter(|_| door.requires_proximity) {
            None => UnlockRequest {
                test_mode,
                ..UnlockRequest::default()
            },
            Some(beacon_id) if test_mode => UnlockRequest {
                test_mode: true,
                simulated_beacon_id: Some(beacon_id),
                observation: None,
            },
            Some(beacon_id) => {
                let observation = provider.observe(&beacon_id, false, cancel).await?;
                UnlockRequest {
                    test_mode: false,
                    simulated_beacon_id: None,
                    observation: Some(ObservationPayload::from(observation)),
                }
            }
        };

        debug!(door_id = %door_id, test_mode, "Submitting unlock request");
        let outcome = self.attempt_unlock(door_id, &request).await?;
        info!(
            door_id = %door_id,
            decision = %outcome.decision,
            "Unlock request answered"
        );
        Ok(outcome)
    }
}

async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let (error, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => (parsed.error, parsed.message),
        Err(_) => ("unknown".to_string(), body),
    };
    Err(ClientError::Api {
        status,
        error,
        message,
    })
}
