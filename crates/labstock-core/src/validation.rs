//! # Validation Module
//!
//! Input validation utilities for LabStock.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP collaborator                                            │
//! │  └── Deserialization, auth                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Positive quantities, non-empty reasons                            │
//! │  └── Runs before any transaction is opened                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── Partial UNIQUE index on the active period                         │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use labstock_core::validation::{validate_movement_reason, validate_quantity};
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(0).is_err());
//! assert!(validate_movement_reason("Purchase order 118").is_ok());
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::{MAX_NAME_LENGTH, MAX_QUANTITY, MAX_REASON_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (component, category, period, request type).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validates the reason attached to a stock movement.
pub fn validate_movement_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(())
}

/// Rejection notes are mandatory.
pub fn validate_rejection_notes(notes: &str) -> ValidationResult<String> {
    let notes = notes.trim();
    if notes.is_empty() {
        return Err(ValidationError::required("rejection_notes"));
    }
    Ok(notes.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a unit quantity (movement amount, requested units).
///
/// ## Rules
/// - Must be positive (> 0)
/// - At most [`MAX_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }
    if qty > MAX_QUANTITY {
        return Err(ValidationError::too_large("quantity", MAX_QUANTITY));
    }
    Ok(())
}

/// Validates a list of ids used as a filter.
pub fn validate_id_list(field: &str, ids: &[i64]) -> ValidationResult<()> {
    if ids.is_empty() {
        return Err(ValidationError::required(field));
    }
    if ids.iter().any(|id| *id <= 0) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "ids must be positive".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// A period must not end before it starts.
pub fn validate_period_range(start: DateTime<Utc>, end: DateTime<Utc>) -> ValidationResult<()> {
    if end < start {
        return Err(ValidationError::InvalidRange {
            field: "academic_period".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
