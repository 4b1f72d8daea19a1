//! Subscription service client.

use std::time::Duration;

use async_trait::async_trait;
use domain::models::MembershipStatus;
use domain::services::{CollaboratorError, MembershipValidator};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use uuid::Uuid;

use super::http::{map_status, map_transport_error};
use crate::config::MembershipConfig;

const SERVICE: &str = "membership";

/// Asks the subscription service whether a member is active.
///
/// `GET {base_url}/members/{user_id}/membership`. An unknown member is an
/// inactive member, not an error.
pub struct HttpMembershipValidator {
    http: Client,
    base_url: String,
}

impl HttpMembershipValidator {
    pub fn new(config: &MembershipConfig) -> Result<Self, reqwest::Error> {
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
impl MembershipValidator for HttpMembershipValidator {
    async fn get_status(&self, user_id: Uuid) -> Result<MembershipStatus, CollaboratorError> {
        let response = self
            .http
            .get(format!("{}/members/{}/membership", self.base_url, user_id))
            .send()
            .await
            .map_err(|e| map_transport_error(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "Member unknown to subscription service");
            return Ok(MembershipStatus::inactive());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(SERVICE, status, body));
        }

        response
            .json::<MembershipStatus>()
            .await
            .map_err(|e| CollaboratorError::unreachable(SERVICE, format!("Bad response: {}", e)))
    }
}

/// Treats every user as an active member without calling out.
///
/// Selected with `membership.provider = "static"` for local development.
pub struct StaticMembershipValidator;

#[async_trait]
impl MembershipValidator for StaticMembershipValidator {
    async fn get_status(&self, user_id: Uuid) -> Result<MembershipStatus, CollaboratorError> {
        info!(user_id = %user_id, "Membership (static provider): active");
        Ok(MembershipStatus::active("static", None))
    }
}
