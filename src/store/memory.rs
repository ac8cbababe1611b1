//! In-memory channel store.

use super::{ChannelStore, SaveCompletion, StoreEntry};
use crate::types::{Channel, ChannelId, ChatUser, Membership, UserId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Upserting record maps. Every write completes inline with `Ok`.
#[derive(Default)]
pub struct MemoryChannelStore {
    records: RwLock<Records>,
}

/// Materialized view of a store's records, also used by the file store.
#[derive(Default)]
pub(crate) struct Records {
    pub(crate) channels: HashMap<ChannelId, Channel>,
    pub(crate) users: HashMap<UserId, ChatUser>,
    pub(crate) memberships: BTreeSet<(UserId, ChannelId)>,
}

impl Records {
    pub(crate) fn apply(&mut self, entry: StoreEntry) {
        match entry {
            StoreEntry::User(user) => {
                self.users.insert(user.id.clone(), user);
            }
            StoreEntry::Membership(membership) => {
                if let Some(channel) = membership.channel {
                    self.channels.insert(channel.id.clone(), channel);
                }
                self.memberships
                    .insert((membership.user_id, membership.channel_id));
            }
        }
    }

    pub(crate) fn memberships_of(&self, user: &UserId) -> Vec<ChannelId> {
        self.memberships
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        self.records.read().channels.get(id).cloned()
    }

    pub fn user(&self, id: &UserId) -> Option<ChatUser> {
        self.records.read().users.get(id).cloned()
    }

    /// Channels the user holds a membership in, ordered by id.
    pub fn memberships(&self, user: &UserId) -> Vec<ChannelId> {
        self.records.read().memberships_of(user)
    }

    pub fn channel_count(&self) -> usize {
        self.records.read().channels.len()
    }
}

impl ChannelStore for MemoryChannelStore {
    fn save(&self, membership: Membership, on_complete: SaveCompletion) {
        self.records.write().apply(StoreEntry::Membership(membership));
        on_complete(Ok(()));
    }

    fn save_user(&self, user: ChatUser, on_complete: SaveCompletion) {
        self.records.write().apply(StoreEntry::User(user));
        on_complete(Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;
    use crate::types::{AvatarRef, ChannelKind};
    use crossbeam_channel::bounded;

    fn channel(label: &str) -> Channel {
        Channel {
            id: normalize(label),
            display_name: label.to_string(),
            kind: ChannelKind::Direct,
            avatar: AvatarRef(format!("https://picsum.photos/seed/{}/200", label)),
        }
    }

    #[test]
    fn test_save_completes_inline() {
        let store = MemoryChannelStore::new();
        let (tx, rx) = bounded(1);
        let membership = Membership::with_channel(UserId::new("u1"), channel("Boston"));
        store.save(
            membership,
            Box::new(move |res| {
                let _ = tx.send(res.is_ok());
            }),
        );
        assert!(rx.try_recv().unwrap());
        assert!(store.channel(&normalize("Boston")).is_some());
        assert_eq!(store.memberships(&UserId::new("u1")), vec![normalize("Boston")]);
    }

    #[test]
    fn test_duplicate_channel_upserts() {
        let store = MemoryChannelStore::new();
        let user = UserId::new("u1");
        store.save(
            Membership::with_channel(user.clone(), channel("boston")),
            Box::new(|_| {}),
        );
        store.save(
            Membership::with_channel(user.clone(), channel("Boston")),
            Box::new(|_| {}),
        );
        assert_eq!(store.channel_count(), 1);
        assert_eq!(
            store.channel(&normalize("Boston")).unwrap().display_name,
            "Boston"
        );
        assert_eq!(store.memberships(&user).len(), 1);
    }
}
