//! Caller-supplied inputs and query filters.
//!
//! These are what the HTTP layer deserializes and hands to the service.
//! Each input validates itself before any transaction is opened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{LoanStatus, MovementType, RequestStatus};
use crate::validation::{
    validate_movement_reason, validate_name, validate_period_range, validate_quantity,
    ValidationResult,
};

// =============================================================================
// Components & Movements
// =============================================================================

/// A new component with its initial stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewComponent {
    pub name: String,
    pub description: Option<String>,
    /// Recorded as the first ingreso movement.
    pub initial_quantity: i64,
    pub category_id: i64,
    /// Reason stored on the initial movement.
    pub reason: String,
    pub image_url: Option<String>,
    /// Defaults to the active period.
    pub academic_period_id: Option<i64>,
}

impl NewComponent {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name("name", &self.name)?;
        validate_quantity(self.initial_quantity)?;
        validate_movement_reason(&self.reason)
    }
}

/// Metadata edit. `None` leaves the field unchanged.
///
/// There is deliberately no quantity here; stock only changes through
/// movements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComponentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub is_active: Option<bool>,
    pub image_url: Option<String>,
}

impl ComponentUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        Ok(())
    }
}

/// Which components a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatusFilter {
    #[default]
    Active,
    Inactive,
    All,
}

impl ComponentStatusFilter {
    /// The `is_active` value to match, or `None` for everything.
    pub const fn is_active(&self) -> Option<bool> {
        match self {
            ComponentStatusFilter::Active => Some(true),
            ComponentStatusFilter::Inactive => Some(false),
            ComponentStatusFilter::All => None,
        }
    }
}

/// Components whose total stock is below a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockFilter {
    /// Strict upper bound on `quantity`
    pub threshold: i64,
    pub category_id: Option<i64>,
}

impl LowStockFilter {
    pub const DEFAULT_THRESHOLD: i64 = 5;

    pub fn validate(&self) -> ValidationResult<()> {
        if self.threshold <= 0 {
            return Err(ValidationError::must_be_positive("threshold"));
        }
        Ok(())
    }
}

impl Default for LowStockFilter {
    fn default() -> Self {
        LowStockFilter {
            threshold: Self::DEFAULT_THRESHOLD,
            category_id: None,
        }
    }
}

/// A manual stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewMovement {
    pub component_id: i64,
    /// Absolute amount; the sign comes from `movement_type`.
    pub quantity: i64,
    pub reason: String,
    pub movement_type: MovementType,
    pub academic_period_id: Option<i64>,
}

impl NewMovement {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_quantity(self.quantity)?;
        validate_movement_reason(&self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementFilter {
    pub component_id: Option<i64>,
    pub movement_type: Option<MovementType>,
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
}

// =============================================================================
// Requests
// =============================================================================

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DetailInput {
    pub component_id: i64,
    pub quantity: i64,
}

/// A borrow request as submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewRequest {
    pub user_id: i64,
    pub type_request: String,
    pub details: Vec<DetailInput>,
    pub description: Option<String>,
    #[ts(as = "Option<String>")]
    pub return_date: Option<DateTime<Utc>>,
    pub responsible: Option<String>,
    /// Set by the service after the proof file is stored.
    pub file_url: Option<String>,
}

impl NewRequest {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name("type_request", &self.type_request)?;
        if self.details.is_empty() {
            return Err(ValidationError::required("details"));
        }
        for detail in &self.details {
            validate_quantity(detail.quantity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestFilter {
    pub user_id: Option<i64>,
    pub status: Option<RequestStatus>,
    pub is_active: Option<bool>,
}

// =============================================================================
// Academic Periods
// =============================================================================

/// A new period, or the replacement fields of an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewAcademicPeriod {
    pub name: String,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
}

impl NewAcademicPeriod {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name("name", &self.name)?;
        validate_period_range(self.start_date, self.end_date)
    }
}

// =============================================================================
// Loan Reports
// =============================================================================

/// Filters shared by the loan report queries. Dates bound `start_date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoanFilter {
    pub user_id: Option<i64>,
    pub component_id: Option<i64>,
    pub status: Option<LoanStatus>,
    pub category_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(details: Vec<DetailInput>) -> NewRequest {
        NewRequest {
            user_id: 1,
            type_request: "practica".to_string(),
            details,
            description: None,
            return_date: None,
            responsible: None,
            file_url: None,
        }
    }

    #[test]
    fn test_request_needs_details() {
        assert_eq!(
            request(vec![]).validate().unwrap_err(),
            ValidationError::required("details")
        );
    }

    #[test]
    fn test_request_rejects_zero_quantity() {
        let err = request(vec![
            DetailInput { component_id: 1, quantity: 2 },
            DetailInput { component_id: 2, quantity: 0 },
        ])
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::must_be_positive("quantity"));
    }

    #[test]
    fn test_new_component_validation() {
        let mut input = NewComponent {
            name: "Arduino Uno".to_string(),
            description: None,
            initial_quantity: 10,
            category_id: 1,
            reason: "Initial stock".to_string(),
            image_url: None,
            academic_period_id: None,
        };
        assert!(input.validate().is_ok());

        input.initial_quantity = 0;
        assert!(input.validate().is_err());

        input.initial_quantity = 1;
        input.reason = "   ".to_string();
        assert_eq!(input.validate().unwrap_err(), ValidationError::required("reason"));
    }

    #[test]
    fn test_period_range() {
        let now = Utc::now();
        let period = NewAcademicPeriod {
            name: "2025-I".to_string(),
            start_date: now,
            end_date: now - Duration::days(1),
        };
        assert!(matches!(
            period.validate(),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_low_stock_filter() {
        let filter = LowStockFilter::default();
        assert_eq!(filter.threshold, 5);
        assert!(filter.validate().is_ok());

        let zero = LowStockFilter {
            threshold: 0,
            ..filter
        };
        assert_eq!(
            zero.validate().unwrap_err(),
            ValidationError::must_be_positive("threshold")
        );
    }

    #[test]
    fn test_status_filter() {
        assert_eq!(ComponentStatusFilter::default().is_active(), Some(true));
        assert_eq!(ComponentStatusFilter::All.is_active(), None);
    }
}
