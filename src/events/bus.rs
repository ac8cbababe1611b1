//! Event bus broadcasting sync events to in-process subscribers.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, EventFilter, EventHandle, EventSubscriptionConfig, EventSubscriptionId, SyncEvent,
};

/// Internal subscription state.
struct Subscriber {
    filter: EventFilter,
    sender: Sender<SyncEvent>,
}

impl Subscriber {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: SyncEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages event subscribers and broadcasts events.
pub struct EventBus {
    /// Active subscribers by ID.
    subscribers: RwLock<HashMap<EventSubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only events published afterwards are seen.
    pub fn subscribe(&self, config: EventSubscriptionConfig) -> EventHandle {
        let id = EventSubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscribers.write().insert(
            id,
            Subscriber {
                filter: config.filter,
                sender,
            },
        );

        EventHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: EventSubscriptionId) {
        if let Some(sub) = self.subscribers.write().remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(SyncEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Broadcast to matching subscribers. Drops subscribers that fail to receive.
    pub fn publish(&self, event: SyncEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if sub.filter.matches(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::debug!(subscriber = id.0, "dropping slow event subscriber");
                    // Try to notify about the drop (might fail, that's ok)
                    let _ = sub.sender.try_send(SyncEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
