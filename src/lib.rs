//! # Location Channels
//!
//! Keeps a pub/sub chat channel subscription in step with a changing
//! "current location" label.
//!
//! ## Core Concepts
//!
//! - **Normalize**: a place name becomes a channel id by dropping whitespace
//!   and lowercasing (`"San Francisco"` → `sanfrancisco`)
//! - **Membership**: a user/channel record written before any subscribe
//! - **Current channel**: the one channel a session follows at a time
//! - **Events**: commits, subscriptions and best-effort failures, observable
//!   after `synchronize` has returned
//!
//! ## Example
//!
//! ```ignore
//! use location_channels::{
//!     LocalTransport, MemoryChannelStore, NoHistory, Session, SessionConfig,
//! };
//! use std::sync::Arc;
//!
//! let session = Session::start(
//!     SessionConfig::default(),
//!     Arc::new(MemoryChannelStore::new()),
//!     Arc::new(LocalTransport::new()),
//!     Arc::new(NoHistory),
//! )?;
//!
//! // The weather lookup resolved a new city
//! session.synchronize("Boston");
//! ```

pub mod config;
mod dispatcher;
pub mod error;
pub mod events;
pub mod manager;
pub mod normalize;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports
pub use config::{AvatarConfig, SessionConfig, SyncConfig};
pub use error::{PersistenceError, Result, SyncError};
pub use events::{
    DropReason, EventBus, EventFilter, EventHandle, EventSubscriptionConfig, EventSubscriptionId,
    SyncEvent, TransportOperation,
};
pub use manager::ChannelSyncManager;
pub use normalize::normalize;
pub use session::Session;
pub use store::{ChannelStore, FileChannelStore, FileStoreConfig, MemoryChannelStore, SaveCompletion};
pub use transport::{HistorySync, LocalTransport, NoHistory, SubscriptionTransport};
pub use types::*;
