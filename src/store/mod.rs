//! Channel store: persistence for channels, memberships and users.
//!
//! Writes are asynchronous from the caller's point of view: a store accepts a
//! record together with a [`SaveCompletion`] and calls it exactly once when
//! the write is durable (or has failed). Duplicate channel ids are upserted.
//!
//! Two implementations ship with the crate:
//! - [`MemoryChannelStore`]: in-process maps, completes inline
//! - [`FileChannelStore`]: append-only checksummed log, replayed on open

mod file;
mod memory;

pub use file::{FileChannelStore, FileStoreConfig};
pub use memory::MemoryChannelStore;

use crate::error::{PersistenceError, Result};
use crate::types::{ChatUser, Membership};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Called once with the outcome of a store write.
pub type SaveCompletion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A completion paired with the receiver its result lands in.
pub(crate) fn completion() -> (SaveCompletion, Receiver<Result<()>>) {
    let (tx, rx) = bounded(1);
    let on_complete: SaveCompletion = Box::new(move |result| {
        // The waiter may have timed out already.
        let _ = tx.send(result);
    });
    (on_complete, rx)
}

/// Wait for a completion, bounded by `timeout` when set.
pub(crate) fn wait_for(
    rx: &Receiver<Result<()>>,
    timeout: Option<Duration>,
) -> std::result::Result<(), PersistenceError> {
    let result = match timeout {
        Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
            RecvTimeoutError::Timeout => PersistenceError::Timeout(limit),
            RecvTimeoutError::Disconnected => PersistenceError::Abandoned,
        })?,
        None => rx.recv().map_err(|_| PersistenceError::Abandoned)?,
    };
    result.map_err(|e| PersistenceError::Store(e.to_string()))
}

/// Persistence for channel and membership records.
///
/// Completions must not call back into the sync manager: it waits on the
/// completion while holding its state lock.
pub trait ChannelStore: Send + Sync {
    /// Upsert a membership and, if embedded, its channel.
    fn save(&self, membership: Membership, on_complete: SaveCompletion);

    /// Upsert a user record.
    fn save_user(&self, user: ChatUser, on_complete: SaveCompletion);
}

/// Write entries shared by the bundled stores.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum StoreEntry {
    User(ChatUser),
    Membership(Membership),
}
