//! # labstock-db: Persistence Gateway for LabStock
//!
//! SQLite storage for the LabStock inventory and loan core, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LabStock Data Flow                               │
//! │                                                                         │
//! │  labstock-service (accept_request)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   labstock-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ComponentRepo │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ RequestRepo   │    │ 001_initial  │  │   │
//! │  │   │ bounded tx    │    │ PeriodRepo    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, configuration, bounded transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types and retry classification
//! - [`repository`] - Repositories and lifecycle procedures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use labstock_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("labstock.db")).await?;
//!
//! let request = db.requests().create(&new_request).await?;
//! let request = db.requests().accept(request.request_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::component::ComponentRepository;
pub use repository::loan::LoanRepository;
pub use repository::movement::MovementRepository;
pub use repository::period::PeriodRepository;
pub use repository::request::RequestRepository;
