//! Membership status as reported by the subscription service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view of a member's subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStatus {
    pub has_active_membership: bool,
    #[serde(default)]
    pub membership_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MembershipStatus {
    pub fn active(name: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            has_active_membership: true,
            membership_name: Some(name.into()),
            expires_at,
        }
    }

    pub fn inactive() -> Self {
        Self {
            has_active_membership: false,
            membership_name: None,
            expires_at: None,
        }
    }
}
