//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length. The surface is purely observational: nothing here mutates the
//! activation engine.

use serde::{Deserialize, Serialize};

use crate::activation::ActivationState;
use crate::events::StateEvent;

/// Serializable mirror of the engine's activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started
    Dormant,
    /// Watching for a wake word or palm gesture
    Idle,
    /// Greeting in progress
    Activated,
    /// The next utterance is a command
    ListeningForCommand,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Dormant
    }
}

impl From<ActivationState> for Phase {
    fn from(state: ActivationState) -> Self {
        match state {
            ActivationState::Dormant => Phase::Dormant,
            ActivationState::Idle => Phase::Idle,
            ActivationState::Activated => Phase::Activated,
            ActivationState::ListeningForCommand => Phase::ListeningForCommand,
        }
    }
}

/// Requests from a shell/UI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to state change notifications
    Subscribe,
}

/// Responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A transition or trigger outcome occurred
    StateEvent(StateEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current activation phase
    pub phase: Phase,

    /// Whether the recognition session is live
    pub listening: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: Phase::default(),
            listening: false,
            uptime_secs: 0,
        }
    }
}
