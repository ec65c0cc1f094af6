//! # Service Error Type
//!
//! The one error the HTTP layer sees.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError ─► CoreError ─► DbError ─► ServiceError ─► HTTP        │
//! │                                                                         │
//! │  {                                                                      │
//! │    "code": "INSUFFICIENT_STOCK",                                        │
//! │    "message": "Insufficient stock for 1 component(s): ...",             │
//! │    "retryable": false,                                                  │
//! │    "shortages": [{ "component_id": 4, "available": 0, ... }]            │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage details (SQL text, file paths) are logged, never returned.

use labstock_core::{CoreError, Shortage};
use labstock_db::DbError;
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

/// Error returned by every [`crate::LabService`] operation.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Whether the same call may succeed if repeated
    pub retryable: bool,

    /// Every under-stocked component, for `INSUFFICIENT_STOCK`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortages: Option<Vec<Shortage>>,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Actor may not perform the operation (403)
    PermissionDenied,

    /// Resource not found (404)
    NotFound,

    /// Entity has dependents, or a duplicate (409)
    Conflict,

    /// Transition not in the lifecycle table (409)
    InvalidTransition,

    /// Second finalize (409)
    AlreadyFinalized,

    /// Second return date update (409)
    AlreadyModified,

    /// Not enough free units (422)
    InsufficientStock,

    /// Administrator must activate a period (503)
    NoActivePeriod,

    /// Timeout, busy database, lost compare-and-swap (503)
    Unavailable,

    /// Storage failure (500)
    DatabaseError,

    /// File storage failure (500)
    StorageError,

    /// Internal error (500)
    Internal,
}

impl ServiceError {
    /// Creates a new, non-retryable service error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ServiceError {
            code,
            message: message.into(),
            retryable: false,
            shortages: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::ValidationError, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ServiceError::new(ErrorCode::StorageError, message)
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self.code {
            ErrorCode::ValidationError => 400,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict
            | ErrorCode::InvalidTransition
            | ErrorCode::AlreadyFinalized
            | ErrorCode::AlreadyModified => 409,
            ErrorCode::InsufficientStock => 422,
            ErrorCode::NoActivePeriod | ErrorCode::Unavailable => 503,
            ErrorCode::DatabaseError | ErrorCode::StorageError | ErrorCode::Internal => 500,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Validation(_) => ServiceError::new(ErrorCode::ValidationError, message),
            CoreError::NotFound { .. } => ServiceError::new(ErrorCode::NotFound, message),
            CoreError::PermissionDenied { .. } => {
                ServiceError::new(ErrorCode::PermissionDenied, message)
            }
            CoreError::InvalidTransition { .. } | CoreError::InvalidStatus { .. } => {
                ServiceError::new(ErrorCode::InvalidTransition, message)
            }
            CoreError::AlreadyFinalized { .. } => {
                ServiceError::new(ErrorCode::AlreadyFinalized, message)
            }
            CoreError::AlreadyModified { .. } => {
                ServiceError::new(ErrorCode::AlreadyModified, message)
            }
            CoreError::Conflict { .. } => ServiceError::new(ErrorCode::Conflict, message),
            CoreError::InsufficientStock(shortages) => ServiceError {
                shortages: Some(shortages),
                ..ServiceError::new(ErrorCode::InsufficientStock, message)
            },
            CoreError::NoActivePeriod => {
                ServiceError::new(ErrorCode::NoActivePeriod, message).retryable()
            }
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        if err.is_retryable() {
            return ServiceError::new(ErrorCode::Unavailable, err.to_string()).retryable();
        }

        match err {
            DbError::Domain(core) => core.into(),
            DbError::UniqueViolation { field, value } => ServiceError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                error!("Foreign key violation: {}", message);
                ServiceError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(e) => {
                error!("Database connection failed: {}", e);
                ServiceError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                error!("Database migration failed: {}", e);
                ServiceError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                error!("Database query failed: {}", e);
                ServiceError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            other => {
                error!("Internal database error: {}", other);
                ServiceError::new(ErrorCode::Internal, "Database operation failed")
            }
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

pub type ServiceResult<T> = Result<T, ServiceError>;
