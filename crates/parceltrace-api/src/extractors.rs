//! Request extractors.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use parceltrace_types::Role;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, as established by the configured
/// authentication strategy.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Coarse role gate; the chaincode remains the source of truth.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::from(parceltrace_types::CustodyError::not_authorized(format!(
                "role {} may not call this endpoint",
                self.role
            ))))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match state.authenticator.authenticate(authorization).await {
            Ok(ctx) => Ok(AuthenticatedUser { user_id: ctx.user_id, role: ctx.role }),
            Err(err) => Err(ApiError::from(err).into_response()),
        }
    }
}
