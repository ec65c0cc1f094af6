//! # Notification Sink
//!
//! Lifecycle events for the mailer. Delivery is fire-and-forget: a full or
//! closed channel is logged and never fails the operation that produced the
//! event, which has already committed.
//!
//! ```text
//! LabService::accept_request ──commit──► notifier.notify(RequestAccepted)
//!                                              │ try_send
//!                                              ▼
//!                                   mpsc::Receiver<Notification>
//!                                   (mail worker, outside this crate)
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use ts_rs::TS;

/// Events the notification collaborator is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "event", rename_all = "snake_case")]
#[ts(export)]
pub enum Notification {
    RequestCreated { request_id: i64, user_id: i64 },
    RequestAccepted { request_id: i64, user_id: i64 },
    RequestRejected {
        request_id: i64,
        user_id: i64,
        reason: String,
    },
}

impl Notification {
    pub fn request_id(&self) -> i64 {
        match self {
            Notification::RequestCreated { request_id, .. }
            | Notification::RequestAccepted { request_id, .. }
            | Notification::RequestRejected { request_id, .. } => *request_id,
        }
    }
}

/// Receives lifecycle notifications. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that drops everything.
pub struct NoOpNotifier;

impl NotificationSink for NoOpNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Sink backed by a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiving end for the delivery worker.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelNotifier { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        let request_id = notification.request_id();
        match self.tx.try_send(notification) {
            Ok(()) => debug!(request_id, "Notification queued"),
            Err(TrySendError::Full(n)) => {
                warn!(request_id, ?n, "Notification channel full, dropping")
            }
            Err(TrySendError::Closed(n)) => {
                warn!(request_id, ?n, "Notification channel closed, dropping")
            }
        }
    }
}
