//! Configuration for the sync manager, sessions and avatars.

use crate::error::{Result, SyncError};
use crate::types::AvatarRef;
use serde::Deserialize;
use std::time::Duration;

/// How avatar URLs are derived from a seed.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Base of the seeded image service, without a trailing slash.
    pub base_url: String,

    /// Square image size in pixels.
    pub size: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            base_url: "https://picsum.photos/seed".to_string(),
            size: 200,
        }
    }
}

impl AvatarConfig {
    /// Avatar for a seed. The seed is percent-encoded as one path segment.
    pub fn url_for(&self, seed: &str) -> AvatarRef {
        AvatarRef(format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(seed.trim()),
            self.size
        ))
    }
}

/// Sync manager configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on waiting for a membership write to be acknowledged,
    /// in milliseconds. `None` waits indefinitely.
    pub save_timeout_ms: Option<u64>,

    /// Whether subscriptions also join the channel's presence topic.
    pub presence: bool,

    /// Avatar derivation for new channels.
    pub avatar: AvatarConfig,

    /// Max buffered events per event subscriber before it is dropped.
    pub event_buffer_size: usize,

    /// How long dropping a manager waits for queued transport work, in
    /// milliseconds. `None` waits indefinitely.
    pub shutdown_timeout_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            save_timeout_ms: Some(10_000),
            presence: true,
            avatar: AvatarConfig::default(),
            event_buffer_size: 1000,
            shutdown_timeout_ms: Some(5_000),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_timeout(&self) -> Option<Duration> {
        self.save_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(SyncError::Config("event_buffer_size must be positive".into()));
        }
        if self.save_timeout_ms == Some(0) {
            return Err(SyncError::Config("save_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Session bootstrap configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sync: SyncConfig,

    /// Fixed user id; a random one is generated when unset.
    pub user_id: Option<String>,

    /// Length of generated user ids.
    pub user_id_len: usize,

    /// Label synchronized right after the session starts.
    pub default_label: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            user_id: None,
            user_id_len: 6,
            default_label: Some("San Francisco".to_string()),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.sync.validate()?;
        if config.user_id.is_none() && config.user_id_len == 0 {
            return Err(SyncError::Config("user_id_len must be positive".into()));
        }
        Ok(config)
    }
}
