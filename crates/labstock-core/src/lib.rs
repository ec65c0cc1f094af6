//! # labstock-core: Pure Domain Logic for LabStock
//!
//! This crate holds the rules of the lab inventory as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LabStock Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                HTTP collaborator (routing, auth)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        labstock-service (config, notifications, files)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ labstock-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐     │   │
//! │  │   │availability│ │ lifecycle │ │ movement  │ │  period   │     │   │
//! │  │   │  formula   │ │transitions│ │ signed qty│ │ one active│     │   │
//! │  │   └────────────┘ └───────────┘ └───────────┘ └───────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 labstock-db (Database Layer)                    │   │
//! │  │        SQLite queries, migrations, transactional procedures     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities and closed status enumerations
//! - [`availability`] - How many units can be lent right now
//! - [`lifecycle`] - Request transition table and permission rules
//! - [`movement`] - Signed ledger arithmetic, non-negative stock
//! - [`period`] - Active period resolution
//! - [`input`] - Caller inputs and filters
//! - [`report`] - Read models
//! - [`error`] - Domain error types
//! - [`validation`] - Field validation
//!
//! ## Example Usage
//!
//! ```rust
//! use labstock_core::availability::{Availability, OpenDemand};
//! use labstock_core::types::RequestStatus;
//!
//! let demand = vec![
//!     OpenDemand { component_id: 1, status: RequestStatus::OnLoan, is_active: true, quantity: 4 },
//!     OpenDemand { component_id: 1, status: RequestStatus::Pending, is_active: true, quantity: 9 },
//! ];
//!
//! // Pending requests do not hold stock.
//! let availability = Availability::calculate(1, 10, &demand);
//! assert_eq!(availability.available_quantity, 6);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod movement;
pub mod period;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{Availability, OpenDemand, Shortage};
pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::{FinalizePath, Transition};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of names (components, categories, periods).
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum length of a movement reason.
pub const MAX_REASON_LENGTH: usize = 255;

/// Largest unit count a single movement, detail line or request total may
/// carry.
pub const MAX_QUANTITY: i64 = 1_000_000_000;
