//! # Repository Module
//!
//! Database repository implementations for LabStock.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Procedures                          │
//! │                                                                         │
//! │  labstock-service                                                      │
//! │       │                                                                 │
//! │       │  db.requests().accept(12)                                       │
//! │       ▼                                                                 │
//! │  RequestRepository::accept                                             │
//! │  ├── BEGIN                                                             │
//! │  ├── load request + details                                            │
//! │  ├── labstock-core: transition table, availability, active period      │
//! │  ├── UPDATE requests ... WHERE status = 'pendiente'   (compare-and-swap)│
//! │  ├── INSERT loan_history, request_periods                              │
//! │  └── COMMIT   (whole procedure bounded by transaction_timeout)         │
//! │                                                                         │
//! │  Rules live in labstock-core; SQL and transaction boundaries live here. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`category::CategoryRepository`] - Category CRUD
//! - [`component::ComponentRepository`] - Catalog, availability, guarded delete
//! - [`movement::MovementRepository`] - Stock movement engine
//! - [`request::RequestRepository`] - Requests and the lifecycle procedures
//! - [`loan::LoanRepository`] - Loan history reports
//! - [`period::PeriodRepository`] - Academic period registry
//!
//! Helpers that take `&mut SqliteConnection` run inside the caller's
//! transaction and never touch the pool.

pub mod category;
pub mod component;
pub mod lifecycle;
pub mod loan;
pub mod movement;
pub mod period;
pub mod request;

#[cfg(test)]
pub(crate) mod test_support;
