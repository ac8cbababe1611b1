//! Keeps the subscribed chat channel in step with the current location label.

use crate::config::SyncConfig;
use crate::dispatcher::{Dispatcher, Job, Link};
use crate::error::{PersistenceError, Result};
use crate::events::{EventBus, EventFilter, EventHandle, EventSubscriptionConfig, SyncEvent};
use crate::normalize::normalize;
use crate::store::{self, ChannelStore};
use crate::transport::{HistorySync, SubscriptionTransport};
use crate::types::{Channel, ChannelId, ChannelKind, Membership, RejectReason, SyncOutcome, UserId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which channel the session is subscribed to right now.
#[derive(Debug, Default)]
struct SyncState {
    current: Option<ChannelId>,
}

/// Drives channel changes: retire the old subscription, persist a membership
/// for the new channel, then sync history and subscribe in the background.
///
/// All collaborators are required at construction, so a manager can never be
/// used half-wired. `synchronize` calls are serialized up to the point where
/// the new channel is committed; history sync and subscribe run on a worker
/// thread after that.
///
/// Dropping the manager waits up to `shutdown_timeout_ms` for queued work.
/// A transport call that hangs past that is left running on a detached
/// thread.
pub struct ChannelSyncManager {
    config: SyncConfig,

    store: Arc<dyn ChannelStore>,

    /// Guards the current channel. Held from comparison through commit.
    state: Mutex<SyncState>,

    /// Number of commits so far.
    generation: AtomicU64,

    link: Arc<Link>,

    events: Arc<EventBus>,

    dispatcher: Dispatcher,
}

impl ChannelSyncManager {
    /// Create a manager with no current channel.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn ChannelStore>,
        transport: Arc<dyn SubscriptionTransport>,
        history: Arc<dyn HistorySync>,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new());
        let link = Arc::new(Link::new(transport, Arc::clone(&events)));
        let dispatcher =
            Dispatcher::spawn(Arc::clone(&link), history, config.shutdown_timeout())?;

        Ok(Self {
            config,
            store,
            state: Mutex::new(SyncState::default()),
            generation: AtomicU64::new(0),
            link,
            events,
            dispatcher,
        })
    }

    /// Move the session to the channel for `raw_label`.
    ///
    /// Returns `Accepted` once the membership write is acknowledged and the
    /// channel is current; history sync and the subscribe are still queued.
    /// A failed write leaves the current channel untouched and queues a
    /// resubscribe to it, since its unsubscribe has already gone out.
    pub fn synchronize(&self, raw_label: &str, user_id: &UserId) -> SyncOutcome {
        let channel_id = normalize(raw_label);
        if channel_id.is_empty() {
            tracing::debug!(label = raw_label, "rejecting empty label");
            return SyncOutcome::Rejected(RejectReason::EmptyLabel);
        }

        let mut state = self.state.lock();
        if state.current.as_ref() == Some(&channel_id) {
            tracing::debug!(channel = %channel_id, "already current");
            return SyncOutcome::NoOp;
        }

        let epoch = self.link.retire(state.current.as_ref());

        let channel = Channel {
            id: channel_id.clone(),
            display_name: raw_label.to_string(),
            kind: ChannelKind::Direct,
            avatar: self.config.avatar.url_for(raw_label),
        };
        let membership = Membership::with_channel(user_id.clone(), channel);

        if let Err(e) = self.persist(membership) {
            tracing::warn!(channel = %channel_id, error = %e, "membership write failed");
            self.events.publish(SyncEvent::PersistenceFailed {
                channel: channel_id,
                error: e.to_string(),
            });
            if let Some(old) = state.current.clone() {
                self.dispatcher.submit(Job::Establish {
                    channel: old,
                    generation: self.generation.load(Ordering::SeqCst),
                    epoch,
                    presence: self.config.presence,
                });
            }
            return SyncOutcome::Failed(e);
        }

        let previous = state.current.replace(channel_id.clone());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            channel = %channel_id,
            previous = ?previous,
            generation,
            "channel committed"
        );
        self.events.publish(SyncEvent::Committed {
            channel: channel_id.clone(),
            previous,
            generation,
        });
        self.dispatcher.submit(Job::Establish {
            channel: channel_id,
            generation,
            epoch,
            presence: self.config.presence,
        });

        SyncOutcome::Accepted
    }

    fn persist(&self, membership: Membership) -> std::result::Result<(), PersistenceError> {
        let (on_complete, rx) = store::completion();
        self.store.save(membership, on_complete);
        store::wait_for(&rx, self.config.save_timeout())
    }

    /// The committed current channel, if any.
    pub fn current_channel(&self) -> Option<ChannelId> {
        self.state.lock().current.clone()
    }

    /// Number of commits so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Subscribe to sync events published from now on.
    pub fn events(&self, filter: EventFilter) -> EventHandle {
        self.events.subscribe(EventSubscriptionConfig {
            buffer_size: self.config.event_buffer_size,
            filter,
        })
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Block until all transport and history work queued so far has run.
    pub fn drain(&self) {
        self.dispatcher.drain();
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::store::{MemoryChannelStore, SaveCompletion};
    use crate::transport::{LocalTransport, NoHistory};
    use crate::types::ChatUser;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::time::{Duration, Instant};

    fn manager_with(store: Arc<dyn ChannelStore>) -> (ChannelSyncManager, Arc<LocalTransport>) {
        let transport = Arc::new(LocalTransport::new());
        let manager = ChannelSyncManager::new(
            SyncConfig::default(),
            store,
            transport.clone(),
            Arc::new(NoHistory),
        )
        .unwrap();
        (manager, transport)
    }

    /// Store that never calls its completion.
    struct DroppingStore;

    impl ChannelStore for DroppingStore {
        fn save(&self, _membership: Membership, on_complete: SaveCompletion) {
            drop(on_complete);
        }

        fn save_user(&self, _user: ChatUser, on_complete: SaveCompletion) {
            drop(on_complete);
        }
    }

    /// Store that fails every write.
    struct FailingStore;

    impl ChannelStore for FailingStore {
        fn save(&self, _membership: Membership, on_complete: SaveCompletion) {
            on_complete(Err(SyncError::Store("disk full".into())));
        }

        fn save_user(&self, _user: ChatUser, on_complete: SaveCompletion) {
            on_complete(Err(SyncError::Store("disk full".into())));
        }
    }

    /// Transport whose subscribe blocks until released.
    struct StuckTransport {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl SubscriptionTransport for StuckTransport {
        fn subscribe(&self, _channels: &[ChannelId], _with_presence: bool) -> Result<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        }

        fn unsubscribe(&self, _channels: &[ChannelId]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_first_channel_committed() {
        let store = Arc::new(MemoryChannelStore::new());
        let (manager, transport) = manager_with(store.clone());
        let user = UserId::new("user1");

        assert_eq!(
            manager.synchronize("San Francisco", &user),
            SyncOutcome::Accepted
        );
        assert_eq!(manager.current_channel(), Some(normalize("San Francisco")));
        assert_eq!(manager.generation(), 1);

        manager.drain();
        assert_eq!(transport.active(), vec![normalize("sanfrancisco")]);
        assert!(transport.has_presence(&normalize("sanfrancisco")));

        let channel = store.channel(&normalize("San Francisco")).unwrap();
        assert_eq!(channel.display_name, "San Francisco");
        assert_eq!(
            channel.avatar.0,
            "https://picsum.photos/seed/San%20Francisco/200"
        );
    }

    #[test]
    fn test_switch_replaces_subscription() {
        let (manager, transport) = manager_with(Arc::new(MemoryChannelStore::new()));
        let user = UserId::new("user1");

        manager.synchronize("San Francisco", &user);
        manager.synchronize("Boston", &user);
        manager.drain();

        assert_eq!(transport.active(), vec![normalize("Boston")]);
        assert_eq!(manager.current_channel(), Some(normalize("boston")));
    }

    #[test]
    fn test_abandoned_completion_fails() {
        let (manager, _) = manager_with(Arc::new(DroppingStore));
        let outcome = manager.synchronize("Boston", &UserId::new("user1"));
        assert_eq!(outcome, SyncOutcome::Failed(PersistenceError::Abandoned));
        assert_eq!(manager.current_channel(), None);
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_store_failure_reported() {
        let (manager, transport) = manager_with(Arc::new(FailingStore));
        let events = manager.events(EventFilter::failures());

        let outcome = manager.synchronize("Boston", &UserId::new("user1"));
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(PersistenceError::Store(_))
        ));
        manager.drain();
        assert!(transport.active().is_empty());
        assert!(matches!(
            events.try_recv(),
            Ok(SyncEvent::PersistenceFailed { .. })
        ));
    }

    #[test]
    fn test_drop_detaches_hung_worker() {
        let (entered_tx, entered) = bounded(1);
        let (release_tx, release) = bounded(1);
        let manager = ChannelSyncManager::new(
            SyncConfig {
                shutdown_timeout_ms: Some(50),
                ..Default::default()
            },
            Arc::new(MemoryChannelStore::new()),
            Arc::new(StuckTransport {
                entered: entered_tx,
                release,
            }),
            Arc::new(NoHistory),
        )
        .unwrap();

        assert!(manager
            .synchronize("Boston", &UserId::new("user1"))
            .is_accepted());
        entered.recv().unwrap();

        let started = Instant::now();
        drop(manager);
        assert!(started.elapsed() < Duration::from_secs(5));
        release_tx.send(()).unwrap();
    }
}
