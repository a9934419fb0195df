//! Client configuration.
//!
//! Every field has a default so an empty TOML table is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectBackoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Engine WebSocket endpoint.  The namespace is appended as `kg=<namespace>`.
    #[serde(default = "d_url")]
    pub url: String,
    /// Knowledge graph to bind on connect (and on every reconnect).
    #[serde(default = "d_namespace")]
    pub namespace: String,
    /// Default per-request deadline for `execute`.  `0` disables it.
    #[serde(default = "d_30000")]
    pub request_timeout_ms: u64,
    #[serde(default = "d_10000")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "d_30000")]
    pub keepalive_interval_ms: u64,
    /// Inbound frames larger than this are dropped unparsed.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: d_url(),
            namespace: d_namespace(),
            request_timeout_ms: d_30000(),
            handshake_timeout_ms: d_10000(),
            keepalive_interval_ms: d_30000(),
            max_frame_bytes: d_max_frame_bytes(),
            reconnect: ReconnectConfig::default(),
            capabilities: Capabilities::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconnect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect automatically after an unexpected close.
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_1000")]
    pub base_delay_ms: u64,
    #[serde(default = "d_30000")]
    pub max_delay_ms: u64,
    /// Retry ceiling per outage.
    #[serde(default = "d_5")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: d_1000(),
            max_delay_ms: d_30000(),
            max_attempts: d_5(),
        }
    }
}

impl ReconnectConfig {
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Engine features the client should expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The engine requires a `login` handshake.  Without it the session is
    /// ready as soon as the socket opens.
    #[serde(default = "d_true")]
    pub login: bool,
    /// The engine may answer with `result_start`/`result_chunk`/`result_end`.
    #[serde(default = "d_true")]
    pub streaming: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            login: true,
            streaming: true,
        }
    }
}

fn d_url() -> String {
    "ws://127.0.0.1:8080/ws".into()
}
fn d_namespace() -> String {
    "default".into()
}
fn d_true() -> bool {
    true
}
fn d_5() -> u32 {
    5
}
fn d_1000() -> u64 {
    1_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_30000() -> u64 {
    30_000
}
fn d_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}
