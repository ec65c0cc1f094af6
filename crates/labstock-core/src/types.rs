//! # Domain Types
//!
//! Core domain types used throughout LabStock.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Component     │   │     Request     │   │  LoanHistory    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  request_id     │   │  request_id     │       │
//! │  │  quantity       │◄──│  status         │──►│  component_id   │       │
//! │  │  category_id    │   │  details[]      │   │  status         │       │
//! │  └────────┬────────┘   └────────┬────────┘   └─────────────────┘       │
//! │           │                     │                                       │
//! │  ┌────────▼────────┐   ┌────────▼────────┐   ┌─────────────────┐       │
//! │  │ComponentMovement│   │  RequestPeriod  │   │ AcademicPeriod  │       │
//! │  │  signed qty     │──►│  type_date      │──►│  is_active      │       │
//! │  │  append-only    │   │  append-only    │   │  (at most one)  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persisted Vocabulary
//! Enum variants carry English names in Rust; their serialized and stored
//! form keeps the vocabulary of the existing database and web client
//! (`pendiente`, `prestamo`, `ingreso`, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Category
// =============================================================================

/// A grouping of components (sensors, microcontrollers, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Component
// =============================================================================

/// A trackable electronic part.
///
/// `quantity` is the total owned stock. It is written only by the stock
/// movement engine, never by metadata updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Component {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Total owned units (non-negative).
    pub quantity: i64,
    pub category_id: i64,
    pub is_active: bool,
    pub image_url: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Movement Type
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum MovementType {
    /// Units entering the lab (purchase, donation, initial stock).
    #[serde(rename = "ingreso")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ingreso"))]
    Ingress,
    /// Units leaving the lab (damage, write-off).
    #[serde(rename = "egreso")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "egreso"))]
    Egress,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Ingress => "ingreso",
            MovementType::Egress => "egreso",
        }
    }
}

/// An immutable ledger entry. `quantity` is signed: positive for ingress,
/// negative for egress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComponentMovement {
    pub id: i64,
    pub component_id: i64,
    pub quantity: i64,
    pub reason: String,
    pub movement_type: MovementType,
    pub academic_period_id: i64,
    #[ts(as = "String")]
    pub movement_date: DateTime<Utc>,
}

// =============================================================================
// Request Status
// =============================================================================

/// Lifecycle status of a borrow request.
///
/// ```text
/// pendiente ──► prestamo ──► finalizado
///                  │             ▲
///                  ▼             │
///             no_devuelto ───────┘
/// ```
///
/// Legal moves are defined once, in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum RequestStatus {
    /// Waiting for an administrator.
    #[serde(rename = "pendiente")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pendiente"))]
    Pending,
    /// Accepted; components are out on loan.
    #[serde(rename = "prestamo")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "prestamo"))]
    OnLoan,
    /// Closed (returned, rejected, or closed after a no-return).
    #[serde(rename = "finalizado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "finalizado"))]
    Finalized,
    /// Loan period over without the components coming back.
    #[serde(rename = "no_devuelto")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "no_devuelto"))]
    NotReturned,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::OnLoan,
        RequestStatus::Finalized,
        RequestStatus::NotReturned,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pendiente",
            RequestStatus::OnLoan => "prestamo",
            RequestStatus::Finalized => "finalizado",
            RequestStatus::NotReturned => "no_devuelto",
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Pending
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: RequestStatus::ALL
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            })
    }
}

// =============================================================================
// Request
// =============================================================================

/// A user's ask to borrow one or more components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Request {
    pub request_id: i64,
    pub user_id: i64,
    pub type_request: String,
    pub status: RequestStatus,
    pub is_active: bool,
    pub description: Option<String>,
    /// Public URL of the proof-of-request file, if one was uploaded.
    pub file_url: Option<String>,
    #[ts(as = "Option<String>")]
    pub return_date: Option<DateTime<Utc>>,
    pub responsible: Option<String>,
    pub admin_notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Owned detail rows (loaded separately).
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub details: Vec<RequestDetail>,
}

/// One line of a request: a component and how many units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RequestDetail {
    pub id: i64,
    pub request_id: i64,
    pub component_id: i64,
    pub quantity: i64,
}

// =============================================================================
// Loan History
// =============================================================================

/// Whether a lent component is back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum LoanStatus {
    #[serde(rename = "no_devuelto")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "no_devuelto"))]
    NotReturned,
    #[serde(rename = "devuelto")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "devuelto"))]
    Returned,
}

/// How a loan was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum LoanOutcome {
    #[serde(rename = "finalizado_normal")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "finalizado_normal"))]
    ReturnedNormally,
    #[serde(rename = "finalizado_no_devuelto")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "finalizado_no_devuelto"))]
    NotReturned,
}

/// Record of a component physically lent out under an accepted request.
/// One row per (request, component) pair, created on acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoanHistory {
    pub id: i64,
    pub request_id: i64,
    pub user_id: i64,
    pub component_id: i64,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub end_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub was_returned: bool,
    pub final_status: Option<LoanOutcome>,
    pub notes: Option<String>,
}

// =============================================================================
// Academic Period
// =============================================================================

/// An administrative time window. At most one is active at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AcademicPeriod {
    pub id: i64,
    pub name: String,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Kind of lifecycle event bound to a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PeriodEvent {
    /// Request accepted; loan starts.
    #[serde(rename = "inicio")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "inicio"))]
    Start,
    /// Request finalized.
    #[serde(rename = "fin")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "fin"))]
    End,
    /// Request marked as not returned.
    #[serde(rename = "no_devuelto")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "no_devuelto"))]
    NotReturned,
    /// The one allowed return date change.
    #[serde(rename = "actualizacion_retorno")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "actualizacion_retorno"))]
    ReturnDateUpdate,
}

/// Append-only audit row binding a lifecycle event to the period active
/// when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RequestPeriod {
    pub id: i64,
    pub request_id: i64,
    pub academic_period_id: i64,
    pub type_date: PeriodEvent,
    #[ts(as = "String")]
    pub request_period_date: DateTime<Utc>,
}

// =============================================================================
// Actors
// =============================================================================

/// Role of the caller, as resolved by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub const fn user(user_id: i64) -> Self {
        Actor {
            user_id,
            role: Role::User,
        }
    }

    pub const fn admin(user_id: i64) -> Self {
        Actor {
            user_id,
            role: Role::Admin,
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
