//! # labstock-service
//!
//! Facade the HTTP layer calls. Wraps the persistence gateway with the
//! effects an operation has outside the database.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP handlers (routing, sessions, auth)                               │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       LabService<F>                              │  │
//! │  │   ServiceConfig ─► Database      NotificationSink   FileStore    │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                            │                                            │
//! │                            ▼                                            │
//! │               labstock-db  ─────►  labstock-core                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use labstock_service::{init_tracing, LabService, ServiceConfig};
//!
//! init_tracing();
//! let config = ServiceConfig::load()?;
//! let (service, notifications) = LabService::from_config(&config).await?;
//! tokio::spawn(mail_worker(notifications));
//!
//! let request = service.accept_request(42).await?;
//! ```

pub mod config;
pub mod error;
pub mod notify;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use notify::{ChannelNotifier, NoOpNotifier, Notification, NotificationSink};
pub use service::LabService;
pub use storage::{FileStore, LocalFileStore, StorageError, Upload};
pub use telemetry::init_tracing;
