//! Core value types: identities, channel records and sync outcomes.

use crate::error::PersistenceError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat identity of the local session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    /// Random alphanumeric id (`[a-zA-Z0-9]{len}`).
    pub fn random(len: usize) -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        UserId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical channel identifier, produced by [`crate::normalize`].
///
/// The empty id is a sentinel for "no valid channel" and never names a real
/// channel.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub(crate) String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ChannelId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ChannelId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Channel type as understood by the chat backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Direct,
}

/// Avatar image location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvatarRef(pub String);

impl fmt::Display for AvatarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat room scoped to one location label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    /// The label as it was observed, before normalization.
    pub display_name: String,
    pub kind: ChannelKind,
    pub avatar: AvatarRef,
}

/// Association between a user and a channel.
///
/// Carries the channel itself so a store can upsert both in one write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default)]
    pub channel: Option<Channel>,
}

impl Membership {
    pub fn with_channel(user_id: UserId, channel: Channel) -> Self {
        Self {
            channel_id: channel.id.clone(),
            user_id,
            channel: Some(channel),
        }
    }
}

/// The session's own user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    pub name: String,
    pub avatar: AvatarRef,
}

/// Why a label was turned away without side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The label normalized to the empty sentinel.
    EmptyLabel,
}

/// Result of one [`crate::ChannelSyncManager::synchronize`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The label maps to the current channel; nothing was done.
    NoOp,
    /// The label was invalid; nothing was done.
    Rejected(RejectReason),
    /// The membership was written and the new channel is now current.
    /// History sync and subscribe are still in flight.
    Accepted,
    /// The membership write failed; the current channel is unchanged.
    Failed(PersistenceError),
}

impl SyncOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SyncOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_id() {
        let id = UserId::random(6);
        assert_eq!(id.as_str().len(), 6);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(UserId::random(16), UserId::random(16));
    }

    #[test]
    fn test_channel_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChannelKind::Direct).unwrap();
        assert_eq!(json, "\"direct\"");
    }

    #[test]
    fn test_membership_with_channel() {
        let channel = Channel {
            id: ChannelId("boston".into()),
            display_name: "Boston".into(),
            kind: ChannelKind::Direct,
            avatar: AvatarRef("https://picsum.photos/seed/Boston/200".into()),
        };
        let membership = Membership::with_channel(UserId::new("abc123"), channel.clone());
        assert_eq!(membership.channel_id, "boston");
        assert_eq!(membership.channel, Some(channel));
    }
}
