//! Session configuration.

use crate::board::BoardConfig;
use crate::sync::{ReconnectPolicy, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Injected settings for one canvas session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sync endpoint (`ws://` or `wss://`).
    pub endpoint: String,
    /// Bearer credential from the auth collaborator.
    pub credential: String,
    /// Canvas to join; `None` for an unsaved canvas.
    pub canvas_id: Option<String>,
    /// Originator tag for outbound frames. A fresh UUID when unset.
    pub originator: Option<String>,
    /// Base URL of the persistence service.
    pub persistence_base_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub freehand_throttle_points: usize,
    pub erase_throttle_ms: u64,
    pub cursor_throttle_ms: u64,
    pub autosave_interval_secs: u64,
    pub name_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:3030/ws".to_string(),
            credential: String::new(),
            canvas_id: None,
            originator: None,
            persistence_base_url: "http://localhost:3001/api/v1".to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            freehand_throttle_points: 5,
            erase_throttle_ms: 16,
            cursor_throttle_ms: 50,
            autosave_interval_secs: 30,
            name_debounce_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse the endpoint, rejecting anything but `ws`/`wss`.
    pub fn endpoint_url(&self) -> Result<Url, SyncError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| SyncError::Connection(format!("invalid endpoint: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(SyncError::Connection(format!(
                "invalid WebSocket URL scheme: {scheme}"
            ))),
        }
    }

    pub fn board(&self) -> BoardConfig {
        BoardConfig {
            freehand_throttle_points: self.freehand_throttle_points,
            erase_throttle: Duration::from_millis(self.erase_throttle_ms),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn name_debounce(&self) -> Duration {
        Duration::from_millis(self.name_debounce_ms)
    }

    pub fn cursor_throttle(&self) -> Duration {
        Duration::from_millis(self.cursor_throttle_ms)
    }
}
