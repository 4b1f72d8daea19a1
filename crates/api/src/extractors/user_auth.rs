//! Authenticated-caller extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::middleware::user_auth::UserAuth;

/// The caller authenticated by [`require_user_auth`].
///
/// Handlers behind that middleware take this instead of re-validating the
/// token.
///
/// [`require_user_auth`]: crate::middleware::user_auth::require_user_auth
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserAuth);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserAuth>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}
