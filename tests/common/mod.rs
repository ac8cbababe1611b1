//! Recording collaborators shared by the integration tests.

#![allow(dead_code)]

use location_channels::{
    ChannelId, ChannelStore, ChatUser, HistorySync, Membership, SaveCompletion,
    SubscriptionTransport, SyncError, UserId,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One observed call against a collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Save { channel: ChannelId, user: UserId },
    SaveUser(UserId),
    Subscribe(Vec<ChannelId>, bool),
    Unsubscribe(Vec<ChannelId>),
    Fetch(ChannelId),
}

/// How the store answers the next write.
#[derive(Clone, Debug)]
pub enum Reply {
    Ok,
    Fail(String),
    /// Complete from another thread after a delay.
    Delayed(Duration),
    /// Drop the completion without calling it.
    Never,
}

/// Ordered log of every call made to any of the doubles.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn saves(&self) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Save { channel, .. } => Some(channel),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

pub struct RecordingStore {
    log: CallLog,
    replies: Mutex<VecDeque<Reply>>,
}

impl RecordingStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue replies for upcoming writes; unqueued writes succeed.
    pub fn reply_with(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().extend(replies);
    }

    fn answer(&self, on_complete: SaveCompletion) {
        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Ok);
        match reply {
            Reply::Ok => on_complete(Ok(())),
            Reply::Fail(msg) => on_complete(Err(SyncError::Store(msg))),
            Reply::Delayed(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    on_complete(Ok(()));
                });
            }
            Reply::Never => drop(on_complete),
        }
    }
}

impl ChannelStore for RecordingStore {
    fn save(&self, membership: Membership, on_complete: SaveCompletion) {
        assert_eq!(
            membership.channel.as_ref().map(|c| &c.id),
            Some(&membership.channel_id),
            "membership must embed its channel"
        );
        self.log.push(Call::Save {
            channel: membership.channel_id,
            user: membership.user_id,
        });
        self.answer(on_complete);
    }

    fn save_user(&self, user: ChatUser, on_complete: SaveCompletion) {
        self.log.push(Call::SaveUser(user.id));
        self.answer(on_complete);
    }
}

pub struct RecordingTransport {
    log: CallLog,
    fail_subscribe: bool,
    fail_unsubscribe: bool,
}

impl RecordingTransport {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_subscribe: false,
            fail_unsubscribe: false,
        }
    }

    pub fn failing(log: CallLog) -> Self {
        Self {
            log,
            fail_subscribe: true,
            fail_unsubscribe: true,
        }
    }
}

impl SubscriptionTransport for RecordingTransport {
    fn subscribe(&self, channels: &[ChannelId], with_presence: bool) -> location_channels::Result<()> {
        self.log
            .push(Call::Subscribe(channels.to_vec(), with_presence));
        if self.fail_subscribe {
            return Err(SyncError::Transport("connection reset".into()));
        }
        Ok(())
    }

    fn unsubscribe(&self, channels: &[ChannelId]) -> location_channels::Result<()> {
        self.log.push(Call::Unsubscribe(channels.to_vec()));
        if self.fail_unsubscribe {
            return Err(SyncError::Transport("connection reset".into()));
        }
        Ok(())
    }
}

pub struct RecordingHistory {
    log: CallLog,
    fail: bool,
}

impl RecordingHistory {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(log: CallLog) -> Self {
        Self { log, fail: true }
    }
}

impl HistorySync for RecordingHistory {
    fn fetch(&self, channel: &ChannelId) -> location_channels::Result<()> {
        self.log.push(Call::Fetch(channel.clone()));
        if self.fail {
            return Err(SyncError::History("history unavailable".into()));
        }
        Ok(())
    }
}

/// Enable log output with `TEST_LOG=1`.
pub fn test_log() {
    use tracing_subscriber::prelude::*;
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::EnvFilter::new(
                    std::env::var("RUST_LOG").unwrap_or_else(|_| "DEBUG".into()),
                ))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_line_number(true)
                        .with_file(true),
                ),
        );
    }
}
