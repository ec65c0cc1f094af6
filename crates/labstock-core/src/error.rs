//! # Error Types
//!
//! Domain-specific error types for labstock-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  labstock-core errors (this file)                                      │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  labstock-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  labstock-service errors                                               │
//! │  └── ServiceError     - What the HTTP layer sees (serialized)          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ServiceError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::availability::Shortage;
use crate::types::RequestStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised by availability checks, the request lifecycle and
/// the academic period registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Status change not present in the transition table.
    #[error("Request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        request_id: i64,
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Operation requires the request to be in a specific status.
    #[error("Request {request_id} is {status}; {operation} requires {required}")]
    InvalidStatus {
        request_id: i64,
        status: RequestStatus,
        required: RequestStatus,
        operation: &'static str,
    },

    /// Finalize called on a request that is already finalized.
    #[error("Request {request_id} is already finalized")]
    AlreadyFinalized { request_id: i64 },

    /// One or more components cannot cover the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Accept request #12 (Arduino x3, Servo x10)
    ///      │
    ///      ▼
    /// Check every component: Servo available=4
    ///      │
    ///      ▼
    /// InsufficientStock([Shortage { Servo, requested 10, available 4, .. }])
    ///      │
    ///      ▼
    /// UI lists every under-stocked component at once
    /// ```
    #[error("Insufficient stock for {} component(s): {}", .0.len(), describe_shortages(.0))]
    InsufficientStock(Vec<Shortage>),

    /// No academic period is active; an administrator must activate one.
    #[error("No active academic period")]
    NoActivePeriod,

    /// Actor is not allowed to perform the operation.
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// The one-time return date update was already used.
    #[error("Return date of request {request_id} was already modified")]
    AlreadyModified { request_id: i64 },

    /// Entity has dependents that protect it.
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CoreError::NotFound { entity, id }
    }

    /// Creates a PermissionDenied error.
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        CoreError::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        CoreError::Conflict {
            reason: reason.into(),
        }
    }
}

fn describe_shortages(shortages: &[Shortage]) -> String {
    shortages
        .iter()
        .map(|s| {
            format!(
                "{} (#{}) requested {}, available {}",
                s.component_name, s.component_id, s.requested, s.available
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Raised before any transaction is opened.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparseable status).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Date range where the end precedes the start.
    #[error("{field} ends before it starts")]
    InvalidRange { field: String },

    /// Numeric value above the accepted maximum.
    #[error("{field} must be at most {max}")]
    TooLarge { field: String, max: i64 },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }

    pub fn too_large(field: impl Into<String>, max: i64) -> Self {
        ValidationError::TooLarge {
            field: field.into(),
            max,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTransition {
            request_id: 7,
            from: RequestStatus::Pending,
            to: RequestStatus::Finalized,
        };
        assert_eq!(
            err.to_string(),
            "Request 7 cannot move from pendiente to finalizado"
        );

        let err = CoreError::not_found("Component", 3);
        assert_eq!(err.to_string(), "Component not found: 3");
    }

    #[test]
    fn test_insufficient_stock_lists_every_component() {
        let err = CoreError::InsufficientStock(vec![
            Shortage {
                component_id: 1,
                component_name: "Arduino Uno".to_string(),
                requested: 5,
                available: 2,
                in_requests: 8,
                not_returned: 0,
            },
            Shortage {
                component_id: 4,
                component_name: "Servo SG90".to_string(),
                requested: 10,
                available: 0,
                in_requests: 3,
                not_returned: 2,
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("Insufficient stock for 2 component(s)"));
        assert!(msg.contains("Arduino Uno (#1) requested 5, available 2"));
        assert!(msg.contains("Servo SG90 (#4) requested 10, available 0"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("reason");
        assert_eq!(err.to_string(), "reason is required");

        let err = ValidationError::must_be_positive("quantity");
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
