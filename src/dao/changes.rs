//! Table change notifications published by the backing store.

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use utoipa::ToSchema;

/// Tables whose changes can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Rides,
    RideParticipants,
}

impl Table {
    /// Name of the table in the relational schema.
    pub fn name(self) -> &'static str {
        match self {
            Table::Rides => "rides",
            Table::RideParticipants => "ride_participants",
        }
    }
}

/// Row-level operation that triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single change notification. Payload rows are not carried: consumers reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the row belongs to.
    pub table: Table,
    /// Insert, update or delete.
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// Connection state of a change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// Whether the channel stopped delivering events for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelStatus::ChannelError | ChannelStatus::TimedOut | ChannelStatus::Closed
        )
    }
}

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    status: watch::Receiver<ChannelStatus>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap the receiving ends and the forwarding task of a feed.
    pub fn new(
        events: mpsc::Receiver<ChangeEvent>,
        status: watch::Receiver<ChannelStatus>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            status,
            task,
        }
    }

    /// Borrow the event and status receivers together so both can be polled in one `select!`.
    pub fn channels(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<ChangeEvent>,
        &mut watch::Receiver<ChannelStatus>,
    ) {
        (&mut self.events, &mut self.status)
    }

    /// Current connection state.
    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Source of table change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for the given tables. Must be called within a Tokio runtime.
    fn subscribe(&self, tables: Vec<Table>) -> Subscription;
}
