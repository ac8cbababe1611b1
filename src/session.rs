//! Session bootstrap: user identity, user preload and the default channel.

use crate::config::SessionConfig;
use crate::error::{Result, SyncError};
use crate::manager::ChannelSyncManager;
use crate::store::{self, ChannelStore};
use crate::transport::{HistorySync, SubscriptionTransport};
use crate::types::{ChatUser, SyncOutcome, UserId};
use std::sync::Arc;

/// A chat session bound to one user identity for its whole lifetime.
pub struct Session {
    user: ChatUser,
    manager: ChannelSyncManager,
}

impl Session {
    /// Assign the user id, store the user record, then join the default
    /// channel if one is configured.
    ///
    /// Failing to store the user is an error; failing to join the default
    /// channel is only logged, the next label change retries it.
    pub fn start(
        config: SessionConfig,
        store: Arc<dyn ChannelStore>,
        transport: Arc<dyn SubscriptionTransport>,
        history: Arc<dyn HistorySync>,
    ) -> Result<Self> {
        if config.user_id.is_none() && config.user_id_len == 0 {
            return Err(SyncError::Config("user_id_len must be positive".into()));
        }
        let id = config
            .user_id
            .map(UserId::new)
            .unwrap_or_else(|| UserId::random(config.user_id_len));
        let user = ChatUser {
            name: id.to_string(),
            avatar: config.sync.avatar.url_for(id.as_str()),
            id,
        };

        let (on_complete, rx) = store::completion();
        store.save_user(user.clone(), on_complete);
        store::wait_for(&rx, config.sync.save_timeout())?;
        tracing::info!(user = %user.id, "session user stored");

        let manager = ChannelSyncManager::new(config.sync, store, transport, history)?;
        let session = Self { user, manager };

        if let Some(label) = config.default_label.as_deref() {
            match session.synchronize(label) {
                SyncOutcome::Failed(e) => {
                    tracing::warn!(label, error = %e, "could not join default channel");
                }
                outcome => tracing::debug!(label, ?outcome, "default channel"),
            }
        }

        Ok(session)
    }

    /// Follow a new location label as this session's user.
    pub fn synchronize(&self, raw_label: &str) -> SyncOutcome {
        self.manager.synchronize(raw_label, &self.user.id)
    }

    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    pub fn manager(&self) -> &ChannelSyncManager {
        &self.manager
    }
}
