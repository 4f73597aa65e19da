//! Cooldown gate shared by both trigger paths
//!
//! The single authority every activation request passes through. Owned by the
//! activation machine, so checking and committing happen in one `&mut self`
//! call and two near-simultaneous triggers cannot both pass the same window.

use std::time::{Duration, Instant};

/// Minimum elapsed time between two accepted activations.
pub const ACTIVATION_COOLDOWN: Duration = Duration::from_millis(5000);

/// Tracks the last accepted activation and rejects requests inside the window.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Accept the request and commit `now` iff the window has elapsed since
    /// the last accepted activation. Rejected requests leave no trace.
    pub fn try_activate(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }

    /// Time left until the next request can pass. Diagnostics only.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_accepted {
            Some(last) => self
                .window
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(ACTIVATION_COOLDOWN)
    }
}
