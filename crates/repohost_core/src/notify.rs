//! Ref-change notifications raised by mirror fetches.

use crate::record::RepositoryRecord;
use crate::storage::{RefUpdateResult, TrackingRefUpdate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Ref that holds ticket tracking data.
pub const TICKETS_REF: &str = "refs/meta/gitblit/tickets";

/// How a ref moved, as seen by receivers of the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiveCommandType {
    Create,
    Update,
    UpdateNonFastForward,
}

impl ReceiveCommandType {
    /// Classifies a fetch result. Anything other than a new, fast-forwarded
    /// or forced ref is left unclassified.
    pub fn from_result(result: RefUpdateResult) -> Option<Self> {
        match result {
            RefUpdateResult::New => Some(Self::Create),
            RefUpdateResult::FastForward => Some(Self::Update),
            RefUpdateResult::Forced => Some(Self::UpdateNonFastForward),
            _ => None,
        }
    }
}

/// A classified ref update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdateEvent {
    pub ref_name: String,
    pub old_id: Option<String>,
    pub new_id: Option<String>,
    pub command: ReceiveCommandType,
}

impl RefUpdateEvent {
    /// Builds an event for a tracking update, `None` if it is unclassified.
    pub fn from_update(update: &TrackingRefUpdate) -> Option<Self> {
        Some(Self {
            ref_name: update.local_name.clone(),
            old_id: update.old_id.clone(),
            new_id: update.new_id.clone(),
            command: ReceiveCommandType::from_result(update.result)?,
        })
    }
}

/// Receives ref-change notifications. Publishing never fails the caller.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, record: &RepositoryRecord, event: &RefUpdateEvent);
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub repository: String,
    pub event: RefUpdateEvent,
}

/// Fans notifications out to every subscriber of a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, record: &RepositoryRecord, event: &RefUpdateEvent) {
        let notification = Notification {
            repository: record.name.clone(),
            event: event.clone(),
        };
        if self.sender.send(notification).is_err() {
            debug!(repository = %record.name, "no subscribers for ref notification");
        }
    }
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, record: &RepositoryRecord, event: &RefUpdateEvent) {
        info!(
            repository = %record.name,
            ref_name = %event.ref_name,
            command = ?event.command,
            "ref updated"
        );
    }
}
