//! Activation engine: the state machine and its cooldown gate
//!
//! Four states:
//! - Dormant: not started, nothing evaluated
//! - Idle: watching for a wake word or palm gesture
//! - Activated: greeting in progress, auto-advances after a fixed delay
//! - ListeningForCommand: the next utterance is dispatched as a command

mod cooldown;
mod machine;

pub use machine::{ActivationMachine, ActivationState};
