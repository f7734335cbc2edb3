//! Error taxonomy for ParcelTrace
//!
//! One taxonomy is shared by the chaincode, the ledger client, and the
//! gateway so that a failure kind survives every boundary unchanged. The
//! gateway maps kinds onto HTTP statuses; the chaincode returns them as
//! synchronous endorsement failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Abstract failure kind, stable across all transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    NotAuthorized,
    NotFound,
    InvalidArgument,
    InvalidState,
    Conflict,
    DependencyFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NotAuthorized => "NOT_AUTHORIZED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::DependencyFailure => "DEPENDENCY_FAILURE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// ParcelTrace error types
#[derive(Debug, Clone, Error)]
pub enum CustodyError {
    // ========================================================================
    // Authentication & authorization
    // ========================================================================

    /// No or invalid session credentials
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Role or involvement check failed
    #[error("Not authorized: {reason}")]
    NotAuthorized { reason: String },

    // ========================================================================
    // Lookup & validation
    // ========================================================================

    /// Entity does not exist
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Shape or constraint validation failed
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// State-machine precondition violated
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Resource already exists
    #[error("{resource} {id} already exists")]
    Conflict { resource: String, id: String },

    // ========================================================================
    // Infrastructure
    // ========================================================================

    /// A collaborator (ledger, CA, store) was unavailable or failed
    #[error("Dependency failure ({dependency}): {reason}")]
    DependencyFailure { dependency: String, reason: String },

    /// A configured call ceiling elapsed before the collaborator answered
    #[error("Deadline of {millis}ms exceeded for {operation}")]
    DeadlineExceeded { operation: String, millis: u64 },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CustodyError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated { reason: reason.into() }
    }

    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::NotAuthorized { reason: reason.into() }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into(), id: id.into() }
    }

    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument { field: field.into(), reason: reason.into() }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState { reason: reason.into() }
    }

    pub fn conflict(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict { resource: resource.into(), id: id.into() }
    }

    pub fn dependency(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependencyFailure { dependency: dependency.into(), reason: reason.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The abstract kind this error maps to across transports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::DependencyFailure { .. } | Self::DeadlineExceeded { .. } => {
                ErrorKind::DependencyFailure
            }
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Stable code for API responses and error frames.
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether the deadline path produced this error (maps to 504, not 502).
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Whether a single retry with the same payload is permitted for an
    /// idempotent operation. Never true for state-machine or validation
    /// failures.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::DependencyFailure { .. })
    }
}
