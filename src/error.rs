//! Error types for channel synchronization and the bundled stores.

use std::time::Duration;
use thiserror::Error;

/// Main error type for store, transport and session operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("History sync error: {0}")]
    History(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Why a membership (or user) write did not complete.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// The store reported a failure through its completion.
    #[error("store rejected the write: {0}")]
    Store(String),

    /// No completion arrived within the configured bound.
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The store dropped the completion without calling it.
    #[error("completion dropped without a result")]
    Abandoned,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, SyncError>;
