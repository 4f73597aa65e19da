//! Event vocabulary for the activation engine
//!
//! Every entry point into the activation machine is a [`CoreEvent`] delivered
//! through one single-consumer channel, so transitions are serialized and each
//! handler re-checks current state before acting. [`StateEvent`] is the
//! outward-facing notification stream for status subscribers.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Which trigger path requested an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// The wake token was heard in an utterance while Idle.
    WakeWord,
    /// The palm-hold gesture was confirmed by the motion detector.
    Gesture,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::WakeWord => write!(f, "wake-word"),
            TriggerSource::Gesture => write!(f, "gesture"),
        }
    }
}

/// A recognized phrase, normalized once at the recognition boundary.
///
/// Lower-cased and trimmed; consumed exactly once, as either a wake-word
/// candidate or a command, depending on the machine's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance(String);

impl Utterance {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substring check used for wake-token matching.
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input events consumed by the activation machine.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// One-time system start from the shell wiring; carries the optional
    /// user name for the personalized greeting.
    Start { user_name: Option<String> },

    /// A trigger detector requests activation. `at` is the instant observed
    /// at the source, so the cooldown gate judges arrival order, not
    /// processing latency.
    Trigger { source: TriggerSource, at: Instant },

    /// A recognized utterance survived the coordinator's mute filter.
    Heard(Utterance),

    /// The greeting delay elapsed for the activation with this epoch.
    AdvanceReady { epoch: u64 },
}

/// Notifications emitted on every transition for status surfaces.
///
/// Purely observational; nothing feeds back into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// The engine left Dormant and both detectors are live.
    SystemStarted,

    /// A trigger passed the cooldown gate; the greeting is being spoken.
    Activated { source: TriggerSource },

    /// A trigger arrived but the cooldown window had not elapsed.
    ActivationBlocked { source: TriggerSource },

    /// The greeting delay elapsed; the next utterance is a command.
    CommandWindowOpened,

    /// A command was captured and handed to the router.
    CommandDispatched { text: String },

    /// Microphone permission was denied; the voice trigger path is gone.
    RecognitionLost,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::SystemStarted => write!(f, "SYSTEM_STARTED"),
            StateEvent::Activated { source } => write!(f, "ACTIVATED ({})", source),
            StateEvent::ActivationBlocked { source } => {
                write!(f, "ACTIVATION_BLOCKED ({})", source)
            }
            StateEvent::CommandWindowOpened => write!(f, "COMMAND_WINDOW_OPENED"),
            StateEvent::CommandDispatched { text } => {
                write!(f, "COMMAND_DISPATCHED ({:?})", text)
            }
            StateEvent::RecognitionLost => write!(f, "RECOGNITION_LOST"),
        }
    }
}
