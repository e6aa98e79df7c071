//! Status Notifications
//!
//! After every committed transition the state machine (and the reconciler)
//! hand a `StatusChanged` to a `StatusNotifier`. Delivery is fire-and-forget:
//! a failed notification is logged and never rolls the transition back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use fieldforce_types::{VerificationStatus, WorkflowAction};

/// Payload handed to downstream delivery (email, socket, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChanged {
    pub marketer_id: Uuid,
    pub submission_id: Uuid,
    pub new_status: VerificationStatus,
    pub action: WorkflowAction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,

    #[error("notification channel full")]
    ChannelFull,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, event: &StatusChanged) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl StatusNotifier for NoopNotifier {
    async fn notify(&self, _event: &StatusChanged) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl StatusNotifier for TracingNotifier {
    async fn notify(&self, event: &StatusChanged) -> Result<(), NotifyError> {
        info!(
            marketer_id = %event.marketer_id,
            submission_id = %event.submission_id,
            status = %event.new_status,
            action = %event.action,
            "Verification status changed"
        );
        Ok(())
    }
}

/// Forwards events to an in-process delivery worker over a bounded channel.
///
/// Uses `try_send`, so a slow consumer drops events instead of stalling the
/// transition that produced them.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<StatusChanged>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StatusChanged>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusNotifier for ChannelNotifier {
    async fn notify(&self, event: &StatusChanged) -> Result<(), NotifyError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::ChannelClosed,
        })
    }
}

/// Deliver without letting a failure escape.
pub(crate) async fn dispatch(notifier: &dyn StatusNotifier, event: StatusChanged) {
    if let Err(e) = notifier.notify(&event).await {
        warn!(
            submission_id = %event.submission_id,
            status = %event.new_status,
            "Status notification failed: {}",
            e
        );
    }
}
