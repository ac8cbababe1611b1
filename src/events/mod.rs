//! Event stream for observing synchronization.
//!
//! `synchronize` returns as soon as the new channel is committed; history
//! sync and the subscription itself finish later on a background worker.
//! Callers that need to know when a channel is actually subscribed, or that
//! a best-effort call failed, listen here.
//!
//! # Example
//!
//! ```ignore
//! let events = manager.events(EventSubscriptionConfig {
//!     filter: EventFilter::channels(vec![normalize("Boston")]),
//!     ..Default::default()
//! });
//!
//! manager.synchronize("Boston", &user);
//!
//! loop {
//!     match events.recv() {
//!         Ok(SyncEvent::Subscribed { channel, .. }) => println!("live in {channel}"),
//!         Ok(SyncEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{
    DropReason, EventFilter, EventHandle, EventSubscriptionConfig, EventSubscriptionId, SyncEvent,
    TransportOperation,
};
