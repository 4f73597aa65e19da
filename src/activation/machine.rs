//! The activation state machine
//!
//! Orchestrates the two trigger detectors against one exclusive state:
//! Dormant until started, Idle while watching for a wake word or palm
//! gesture, Activated while the greeting plays, ListeningForCommand for
//! exactly one utterance. All inputs arrive as [`CoreEvent`]s on a single
//! channel; every handler re-checks the current state, since an event may be
//! stale by the time it is processed.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::events::{CoreEvent, StateEvent, TriggerSource, Utterance};
use crate::router::CommandRouter;
use crate::speech::SpeechHandle;

use super::cooldown::CooldownGate;

/// Delay between the greeting starting and the command window opening.
const GREETING_ADVANCE_DELAY: Duration = Duration::from_millis(2500);

/// The four possible states of the activation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Not started; no detection evaluated, no listening.
    #[default]
    Dormant,
    /// Both detectors live, waiting for a trigger.
    Idle,
    /// Trigger accepted; greeting in progress.
    Activated,
    /// The next utterance is a command.
    ListeningForCommand,
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Dormant => write!(f, "Dormant"),
            ActivationState::Idle => write!(f, "Idle"),
            ActivationState::Activated => write!(f, "Activated"),
            ActivationState::ListeningForCommand => write!(f, "ListeningForCommand"),
        }
    }
}

/// The state machine driving activations
pub struct ActivationMachine {
    /// Current state; mutated only by `transition_to`
    state: ActivationState,
    /// Single gate consulted by every trigger source
    cooldown: CooldownGate,
    /// Bumped per activation; stale `AdvanceReady` events are dropped
    epoch: u64,
    /// Name captured at start, used for the personalized greeting
    user_name: Option<String>,
    /// Token that arms the system when heard while Idle
    wake_token: String,
    /// Spoken-output channel (greeting)
    speech: SpeechHandle,
    /// Command destination, invoked after returning to Idle
    router: Box<dyn CommandRouter>,
    /// Outward notifications for status subscribers
    event_tx: broadcast::Sender<StateEvent>,
    /// State fan-out for the detector and coordinator tasks
    state_tx: watch::Sender<ActivationState>,
    /// Loop-back channel for scheduled `AdvanceReady` events
    self_tx: mpsc::Sender<CoreEvent>,
    advance_delay: Duration,
}

impl ActivationMachine {
    pub fn new(
        wake_token: String,
        speech: SpeechHandle,
        router: Box<dyn CommandRouter>,
        event_tx: broadcast::Sender<StateEvent>,
        state_tx: watch::Sender<ActivationState>,
        self_tx: mpsc::Sender<CoreEvent>,
    ) -> Self {
        Self {
            state: ActivationState::Dormant,
            cooldown: CooldownGate::default(),
            epoch: 0,
            user_name: None,
            wake_token: wake_token.to_lowercase(),
            speech,
            router,
            event_tx,
            state_tx,
            self_tx,
            advance_delay: GREETING_ADVANCE_DELAY,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Run the machine, processing core events until the channel closes
    pub async fn run(&mut self, mut core_rx: mpsc::Receiver<CoreEvent>) {
        info!("activation engine started in Dormant state");

        while let Some(event) = core_rx.recv().await {
            self.handle_event(event);
        }

        info!("activation engine stopped");
    }

    fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Start { user_name } => self.handle_start(user_name),
            CoreEvent::Trigger { source, at } => self.handle_trigger(source, at),
            CoreEvent::Heard(utterance) => self.handle_utterance(utterance),
            CoreEvent::AdvanceReady { epoch } => self.handle_advance(epoch),
        }
    }

    /// One-time system start from the shell wiring
    fn handle_start(&mut self, user_name: Option<String>) {
        if self.state != ActivationState::Dormant {
            warn!(state = %self.state, "start requested while already running; ignoring");
            return;
        }

        self.user_name = user_name;
        self.transition_to(ActivationState::Idle);
        self.emit(StateEvent::SystemStarted);
    }

    /// An activation request from either trigger path
    fn handle_trigger(&mut self, source: TriggerSource, at: Instant) {
        if self.state != ActivationState::Idle {
            debug!(%source, state = %self.state, "trigger ignored outside Idle");
            return;
        }

        if !self.cooldown.try_activate(at) {
            info!(
                %source,
                remaining_ms = self.cooldown.remaining(at).as_millis() as u64,
                "activation blocked by cooldown"
            );
            self.emit(StateEvent::ActivationBlocked { source });
            return;
        }

        self.transition_to(ActivationState::Activated);
        self.emit(StateEvent::Activated { source });
        self.speech.speak(self.greeting());
        self.schedule_advance();
    }

    /// A recognized utterance; its role depends on the current state
    fn handle_utterance(&mut self, utterance: Utterance) {
        match self.state {
            ActivationState::Idle => {
                if utterance.contains(&self.wake_token) {
                    self.handle_trigger(TriggerSource::WakeWord, Instant::now());
                } else {
                    debug!(%utterance, "no wake token, dropping");
                }
            }
            ActivationState::ListeningForCommand => {
                let command = utterance.into_string();

                // Back to Idle before routing, so the router's spoken replies
                // run under normal Idle wiring and a second utterance during
                // routing cannot become a second command.
                self.transition_to(ActivationState::Idle);
                self.emit(StateEvent::CommandDispatched {
                    text: command.clone(),
                });

                info!(command = %command, "dispatching command");
                self.router.handle(&command);
            }
            ActivationState::Dormant | ActivationState::Activated => {
                debug!(%utterance, state = %self.state, "utterance ignored");
            }
        }
    }

    /// The greeting delay elapsed for some past activation
    fn handle_advance(&mut self, epoch: u64) {
        if self.state != ActivationState::Activated || epoch != self.epoch {
            debug!(epoch, current = self.epoch, "stale advance, dropping");
            return;
        }

        self.transition_to(ActivationState::ListeningForCommand);
        self.emit(StateEvent::CommandWindowOpened);
    }

    fn schedule_advance(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        let delay = self.advance_delay;
        let tx = self.self_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreEvent::AdvanceReady { epoch }).await;
        });
    }

    fn greeting(&self) -> String {
        match &self.user_name {
            Some(name) => format!("Hello {}! How can I help you?", name),
            None => "Hello! How can I help you?".to_string(),
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: ActivationState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        info!(from = %old_state, to = %new_state, "state transition");

        self.state = new_state;
        let _ = self.state_tx.send(new_state);
    }

    fn emit(&self, event: StateEvent) {
        debug!(?event, "emitting state event");
        let _ = self.event_tx.send(event);
    }
}
