//! Pub/sub transport and history sync seams.

use crate::error::Result;
use crate::types::ChannelId;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Subscribe/unsubscribe against the pub/sub backend.
///
/// Calls are best effort: the sync manager logs failures and carries on.
pub trait SubscriptionTransport: Send + Sync {
    fn subscribe(&self, channels: &[ChannelId], with_presence: bool) -> Result<()>;

    fn unsubscribe(&self, channels: &[ChannelId]) -> Result<()>;
}

/// Retrieves past messages for a channel. Fire-and-forget.
pub trait HistorySync: Send + Sync {
    fn fetch(&self, channel: &ChannelId) -> Result<()>;
}

/// History sync that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHistory;

impl HistorySync for NoHistory {
    fn fetch(&self, _channel: &ChannelId) -> Result<()> {
        Ok(())
    }
}

/// In-process transport that tracks which channels are subscribed.
///
/// Subscribing twice is a no-op, as is unsubscribing an unknown channel.
#[derive(Default)]
pub struct LocalTransport {
    /// Active subscriptions and whether presence was requested.
    active: RwLock<BTreeMap<ChannelId, bool>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently subscribed channels, ordered by id.
    pub fn active(&self) -> Vec<ChannelId> {
        self.active.read().keys().cloned().collect()
    }

    pub fn is_subscribed(&self, channel: &ChannelId) -> bool {
        self.active.read().contains_key(channel)
    }

    pub fn has_presence(&self, channel: &ChannelId) -> bool {
        self.active.read().get(channel).copied().unwrap_or(false)
    }
}

impl SubscriptionTransport for LocalTransport {
    fn subscribe(&self, channels: &[ChannelId], with_presence: bool) -> Result<()> {
        let mut active = self.active.write();
        for channel in channels {
            active.insert(channel.clone(), with_presence);
        }
        Ok(())
    }

    fn unsubscribe(&self, channels: &[ChannelId]) -> Result<()> {
        let mut active = self.active.write();
        for channel in channels {
            active.remove(channel);
        }
        Ok(())
    }
}
