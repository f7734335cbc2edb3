//! API error handling.
//!
//! Chaincode errors are resurfaced verbatim (kind + message); the gateway
//! adds the HTTP shell and a correlation id. The same JSON shape rides on
//! WebSocket `system:error` frames.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use parceltrace_types::{CustodyError, ErrorKind};

pub type ApiResult<T> = Result<T, ApiError>;

/// An error on its way out of the gateway.
#[derive(Debug)]
pub struct ApiError {
    pub error: CustodyError,
    pub correlation_id: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.error.kind() {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::DependencyFailure => {
                if self.error.is_deadline() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CustodyError> for ApiError {
    fn from(error: CustodyError) -> Self {
        Self { error, correlation_id: Uuid::new_v4().to_string() }
    }
}

/// The failure envelope: `success:false` plus kind code and message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    pub correlation_id: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            success: false,
            message: err.error.to_string(),
            code: err.error.error_code(),
            correlation_id: err.correlation_id.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                correlation_id = %self.correlation_id,
                code = self.error.error_code(),
                "request failed: {}",
                self.error
            );
        } else {
            tracing::debug!(
                correlation_id = %self.correlation_id,
                code = self.error.error_code(),
                "request rejected: {}",
                self.error
            );
        }
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_error_table() {
        let cases = [
            (CustodyError::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (CustodyError::not_authorized("x"), StatusCode::FORBIDDEN),
            (CustodyError::not_found("Delivery", "x"), StatusCode::NOT_FOUND),
            (CustodyError::invalid_argument("f", "x"), StatusCode::BAD_REQUEST),
            (CustodyError::invalid_state("x"), StatusCode::CONFLICT),
            (CustodyError::conflict("Delivery", "x"), StatusCode::CONFLICT),
            (CustodyError::dependency("ledger", "x"), StatusCode::BAD_GATEWAY),
            (CustodyError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }

        let deadline = CustodyError::DeadlineExceeded { operation: "submit".into(), millis: 1 };
        assert_eq!(ApiError::from(deadline).status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn body_carries_code_and_correlation_id() {
        let err = ApiError::from(CustodyError::invalid_state("no pending handoff"));
        let body = ErrorBody::from(&err);
        assert!(!body.success);
        assert_eq!(body.code, "INVALID_STATE");
        assert_eq!(body.correlation_id, err.correlation_id);
        assert!(body.message.contains("no pending handoff"));
    }
}
