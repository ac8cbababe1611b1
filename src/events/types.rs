//! Event types for observing channel synchronization.

use crate::types::ChannelId;
use serde::{Deserialize, Serialize};

/// Configuration for an event subscription.
#[derive(Clone, Debug)]
pub struct EventSubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for EventSubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::all(),
        }
    }
}

/// Filter criteria for event subscriptions.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Only events about these channels (None = all channels).
    pub channels: Option<Vec<ChannelId>>,

    /// Only failure events.
    pub failures_only: bool,
}

impl EventFilter {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Events about specific channels.
    pub fn channels(channels: Vec<ChannelId>) -> Self {
        Self {
            channels: Some(channels),
            ..Default::default()
        }
    }

    /// Persistence and transport failures only.
    pub fn failures() -> Self {
        Self {
            failures_only: true,
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, event: &SyncEvent) -> bool {
        if self.failures_only && !event.is_failure() {
            return false;
        }
        match (&self.channels, event.channel()) {
            (Some(ids), Some(channel)) => ids.contains(channel),
            _ => true,
        }
    }
}

/// Transport call that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportOperation {
    Subscribe,
    Unsubscribe,
    HistorySync,
}

/// Events emitted while synchronizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A new channel became current.
    Committed {
        channel: ChannelId,
        previous: Option<ChannelId>,
        generation: u64,
    },

    /// The previous channel's subscription was retired.
    Unsubscribed { channel: ChannelId },

    /// History sync for a channel was issued.
    HistorySynced { channel: ChannelId },

    /// The channel's subscription was established.
    Subscribed { channel: ChannelId, presence: bool },

    /// A downstream job gave up because a later commit replaced its channel.
    Superseded { channel: ChannelId, generation: u64 },

    /// A best-effort transport or history call failed.
    TransportFailed {
        channel: ChannelId,
        operation: TransportOperation,
        error: String,
    },

    /// The membership write failed; the current channel did not change.
    PersistenceFailed { channel: ChannelId, error: String },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl SyncEvent {
    pub fn channel(&self) -> Option<&ChannelId> {
        match self {
            SyncEvent::Committed { channel, .. }
            | SyncEvent::Unsubscribed { channel }
            | SyncEvent::HistorySynced { channel }
            | SyncEvent::Subscribed { channel, .. }
            | SyncEvent::Superseded { channel, .. }
            | SyncEvent::TransportFailed { channel, .. }
            | SyncEvent::PersistenceFailed { channel, .. } => Some(channel),
            SyncEvent::Dropped { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncEvent::TransportFailed { .. } | SyncEvent::PersistenceFailed { .. }
        )
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for an event subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventSubscriptionId(pub u64);

/// Handle to receive events.
pub struct EventHandle {
    pub id: EventSubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl EventHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
