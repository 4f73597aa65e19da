//! Speech coordinator: one session, no feedback loops
//!
//! Owns the single continuous recognition session and the synthesis channel.
//! While the daemon speaks, recognition results are discarded before they can
//! reach the activation machine, and stay discarded for a grace period after
//! playback so residual audio cannot re-trigger the listener.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::activation::ActivationState;
use crate::events::{CoreEvent, StateEvent, Utterance};

use super::{RecognitionEvent, RecognitionService, SynthesisService};

/// Silence tail after spoken output during which results are discarded.
const UNMUTE_GRACE: Duration = Duration::from_secs(3);

/// Fixed backoff before restarting a recognition session.
const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Requests accepted by the coordinator.
#[derive(Debug, Clone)]
pub enum SpeechCommand {
    Speak { text: String },
}

/// Cloneable handle for speaking through the coordinator.
#[derive(Clone)]
pub struct SpeechHandle {
    tx: mpsc::Sender<SpeechCommand>,
}

impl SpeechHandle {
    pub fn new(tx: mpsc::Sender<SpeechCommand>) -> Self {
        Self { tx }
    }

    /// Queue one phrase. The system speaks at most one phrase per
    /// transition, so a full channel means something is badly wrong; the
    /// phrase is dropped with a warning rather than blocking a handler.
    pub fn speak(&self, text: impl Into<String>) {
        let text = text.into();
        if self.tx.try_send(SpeechCommand::Speak { text }).is_err() {
            warn!("speech channel unavailable, dropping phrase");
        }
    }
}

/// Timer and completion callbacks routed back into the coordinator loop.
#[derive(Debug)]
enum Pulse {
    /// Synthesis finished (or failed; treated the same).
    SpeakDone,
    /// A grace period elapsed; only honored if the generation is current.
    Unmute { generation: u64 },
    /// The restart backoff elapsed.
    RestartDue,
}

/// Owns the recognition session lifecycle and the self-mute policy.
pub struct SpeechCoordinator {
    recognizer: Box<dyn RecognitionService>,
    synthesizer: Box<dyn SynthesisService>,
    recognition_rx: mpsc::Receiver<RecognitionEvent>,
    command_rx: mpsc::Receiver<SpeechCommand>,
    core_tx: mpsc::Sender<CoreEvent>,
    state_rx: watch::Receiver<ActivationState>,
    event_tx: broadcast::Sender<StateEvent>,
    listening_tx: watch::Sender<bool>,
    pulse_tx: mpsc::Sender<Pulse>,
    pulse_rx: mpsc::Receiver<Pulse>,
    /// Whether the underlying service is currently running.
    active: bool,
    /// Application-level mute; the service keeps running while paused.
    paused: bool,
    /// Permission denied: never restart.
    fatal: bool,
    /// At most one restart may be pending at a time.
    restart_pending: bool,
    /// The last completed speak governs the unmute time.
    unmute_generation: u64,
    grace: Duration,
    restart_delay: Duration,
}

impl SpeechCoordinator {
    /// Build the coordinator. Returns the speak handle and a watch mirror
    /// of "is the session live" for the status surface.
    pub fn new(
        recognizer: Box<dyn RecognitionService>,
        synthesizer: Box<dyn SynthesisService>,
        recognition_rx: mpsc::Receiver<RecognitionEvent>,
        core_tx: mpsc::Sender<CoreEvent>,
        state_rx: watch::Receiver<ActivationState>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> (Self, SpeechHandle, watch::Receiver<bool>) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (pulse_tx, pulse_rx) = mpsc::channel(8);
        let (listening_tx, listening_rx) = watch::channel(false);

        let coordinator = Self {
            recognizer,
            synthesizer,
            recognition_rx,
            command_rx,
            core_tx,
            state_rx,
            event_tx,
            listening_tx,
            pulse_tx,
            pulse_rx,
            active: false,
            paused: false,
            fatal: false,
            restart_pending: false,
            unmute_generation: 0,
            grace: UNMUTE_GRACE,
            restart_delay: RESTART_DELAY,
        };

        (coordinator, SpeechHandle::new(command_tx), listening_rx)
    }

    /// Run the coordinator loop until every input is gone.
    pub async fn run(mut self) {
        info!("speech coordinator started");

        // The engine may already be past Dormant by the time we run.
        self.maybe_start_session();

        loop {
            tokio::select! {
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.maybe_start_session();
                }
                Some(event) = self.recognition_rx.recv() => {
                    self.handle_recognition(event).await;
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command);
                }
                Some(pulse) = self.pulse_rx.recv() => {
                    self.handle_pulse(pulse);
                }
                else => break,
            }
        }

        info!("speech coordinator stopped");
    }

    /// Start the session iff the engine is awake and the path still viable.
    fn maybe_start_session(&mut self) {
        if self.active || self.fatal {
            return;
        }
        if *self.state_rx.borrow() == ActivationState::Dormant {
            return;
        }

        match self.recognizer.start() {
            Ok(()) => {
                info!("recognition session started");
                self.set_active(true);
            }
            Err(e) => {
                warn!(?e, "recognition start failed");
                self.schedule_restart();
            }
        }
    }

    async fn handle_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                self.set_active(true);
            }
            RecognitionEvent::Result { text } => {
                if self.paused {
                    debug!(text = %text, "muted, discarding result");
                    return;
                }
                let utterance = Utterance::new(&text);
                if utterance.is_empty() {
                    return;
                }
                debug!(%utterance, "forwarding utterance");
                let _ = self.core_tx.send(CoreEvent::Heard(utterance)).await;
            }
            RecognitionEvent::Error { kind } => {
                if kind.is_fatal() {
                    error!("microphone permission denied; voice trigger disabled");
                    self.fatal = true;
                    self.set_active(false);
                    let _ = self.event_tx.send(StateEvent::RecognitionLost);
                } else {
                    debug!(?kind, "transient recognition error");
                    self.set_active(false);
                    self.schedule_restart();
                }
            }
            RecognitionEvent::Ended => {
                if self.fatal {
                    return;
                }
                debug!("recognition session ended, restarting");
                self.set_active(false);
                self.schedule_restart();
            }
        }
    }

    fn handle_command(&mut self, command: SpeechCommand) {
        match command {
            SpeechCommand::Speak { text } => {
                // Mute before the text reaches the output channel, so a
                // result arriving during synthesis is already discarded.
                self.paused = true;
                debug!(text = %text, "speaking, recognition muted");

                let (done_tx, done_rx) = oneshot::channel();
                self.synthesizer.speak(&text, done_tx);

                let pulse_tx = self.pulse_tx.clone();
                tokio::spawn(async move {
                    // Completion and failure look the same from here.
                    let _ = done_rx.await;
                    let _ = pulse_tx.send(Pulse::SpeakDone).await;
                });
            }
        }
    }

    fn handle_pulse(&mut self, pulse: Pulse) {
        match pulse {
            Pulse::SpeakDone => {
                self.unmute_generation += 1;
                let generation = self.unmute_generation;
                let grace = self.grace;
                let pulse_tx = self.pulse_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = pulse_tx.send(Pulse::Unmute { generation }).await;
                });
            }
            Pulse::Unmute { generation } => {
                // A newer speak completed meanwhile: its timer governs.
                if generation == self.unmute_generation {
                    debug!("grace period over, recognition unmuted");
                    self.paused = false;
                }
            }
            Pulse::RestartDue => {
                self.restart_pending = false;
                self.maybe_start_session();
            }
        }
    }

    fn schedule_restart(&mut self) {
        if self.restart_pending || self.fatal {
            return;
        }
        if *self.state_rx.borrow() == ActivationState::Dormant {
            return;
        }

        self.restart_pending = true;
        let delay = self.restart_delay;
        let pulse_tx = self.pulse_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = pulse_tx.send(Pulse::RestartDue).await;
        });
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        let _ = self.listening_tx.send(active);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::speech::RecognitionErrorKind;

    /// Recognizer double counting start calls; events come from the test.
    struct CountingRecognizer {
        starts: Arc<AtomicUsize>,
    }

    impl RecognitionService for CountingRecognizer {
        fn start(&mut self) -> Result<(), crate::speech::SpeechError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {}
    }

    /// Synthesizer double that completes instantly.
    struct InstantSynthesizer {
        spoken: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl SynthesisService for InstantSynthesizer {
        fn speak(&mut self, text: &str, done: oneshot::Sender<()>) {
            self.spoken.lock().unwrap().push(text.to_string());
            let _ = done.send(());
        }
    }

    struct Harness {
        handle: SpeechHandle,
        recognition_tx: mpsc::Sender<RecognitionEvent>,
        core_rx: mpsc::Receiver<CoreEvent>,
        event_rx: broadcast::Receiver<StateEvent>,
        listening_rx: watch::Receiver<bool>,
        state_tx: watch::Sender<ActivationState>,
        starts: Arc<AtomicUsize>,
        spoken: Arc<std::sync::Mutex<Vec<String>>>,
    }

    fn spawn_coordinator(initial_state: ActivationState) -> Harness {
        let (recognition_tx, recognition_rx) = mpsc::channel(16);
        let (core_tx, core_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let (state_tx, state_rx) = watch::channel(initial_state);

        let starts = Arc::new(AtomicUsize::new(0));
        let spoken = Arc::new(std::sync::Mutex::new(Vec::new()));

        let (coordinator, handle, listening_rx) = SpeechCoordinator::new(
            Box::new(CountingRecognizer {
                starts: Arc::clone(&starts),
            }),
            Box::new(InstantSynthesizer {
                spoken: Arc::clone(&spoken),
            }),
            recognition_rx,
            core_tx,
            state_rx,
            event_tx,
        );
        tokio::spawn(coordinator.run());

        Harness {
            handle,
            recognition_tx,
            core_rx,
            event_rx,
            listening_rx,
            state_tx,
            starts,
            spoken,
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_reach_the_machine_while_unmuted() {
        let mut h = spawn_coordinator(ActivationState::Idle);

        h.recognition_tx
            .send(RecognitionEvent::Result {
                text: "  Hey Beckon ".into(),
            })
            .await
            .unwrap();

        let event = h.core_rx.recv().await.expect("utterance expected");
        match event {
            CoreEvent::Heard(utterance) => assert_eq!(utterance.as_str(), "hey beckon"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_results_are_dropped() {
        let mut h = spawn_coordinator(ActivationState::Idle);

        h.recognition_tx
            .send(RecognitionEvent::Result { text: "   ".into() })
            .await
            .unwrap();
        settle().await;
        assert!(h.core_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_result_reaches_machine_while_paused() {
        let mut h = spawn_coordinator(ActivationState::Idle);

        h.handle.speak("Hello! How can I help you?");
        settle().await;
        assert_eq!(*h.spoken.lock().unwrap(), ["Hello! How can I help you?"]);

        // Synthesis completed instantly; the grace period is running. Any
        // number of results fired now must be discarded.
        for _ in 0..3 {
            h.recognition_tx
                .send(RecognitionEvent::Result {
                    text: "echo of my own greeting".into(),
                })
                .await
                .unwrap();
        }
        settle().await;
        assert!(h.core_rx.try_recv().is_err());

        // After the grace period the mute lifts.
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        h.recognition_tx
            .send(RecognitionEvent::Result {
                text: "open music".into(),
            })
            .await
            .unwrap();
        let event = h.core_rx.recv().await.expect("unmuted result expected");
        assert!(matches!(event, CoreEvent::Heard(u) if u.as_str() == "open music"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_speak_governs_unmute() {
        let mut h = spawn_coordinator(ActivationState::Idle);

        h.handle.speak("first");
        settle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        // A second speak 2s in restarts the grace clock: 1s later the first
        // timer would have fired, but the mute must hold.
        h.handle.speak("second");
        settle().await;
        tokio::time::advance(Duration::from_millis(1100)).await;
        settle().await;

        h.recognition_tx
            .send(RecognitionEvent::Result {
                text: "too early".into(),
            })
            .await
            .unwrap();
        settle().await;
        assert!(h.core_rx.try_recv().is_err());

        // The second grace period ends 3s after the second completion.
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        h.recognition_tx
            .send(RecognitionEvent::Result { text: "now".into() })
            .await
            .unwrap();
        assert!(h.core_rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_restarts_once() {
        let mut h = spawn_coordinator(ActivationState::Idle);
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);

        // Error and the session-end that usually follows it: one restart.
        h.recognition_tx
            .send(RecognitionEvent::Error {
                kind: RecognitionErrorKind::NoSpeech,
            })
            .await
            .unwrap();
        h.recognition_tx.send(RecognitionEvent::Ended).await.unwrap();
        settle().await;
        assert!(!*h.listening_rx.borrow());

        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 2);
        assert!(*h.listening_rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_is_terminal() {
        let mut h = spawn_coordinator(ActivationState::Idle);
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);

        h.recognition_tx
            .send(RecognitionEvent::Error {
                kind: RecognitionErrorKind::PermissionDenied,
            })
            .await
            .unwrap();
        settle().await;

        assert!(!*h.listening_rx.borrow());
        assert!(matches!(
            h.event_rx.try_recv(),
            Ok(StateEvent::RecognitionLost)
        ));

        // No restart, not even after a generous wait.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);

        // A later session end must not resurrect it either.
        h.recognition_tx.send(RecognitionEvent::Ended).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_while_dormant() {
        let h = spawn_coordinator(ActivationState::Dormant);
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 0);

        // Waking the engine starts the session.
        h.state_tx.send(ActivationState::Idle).unwrap();
        settle().await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);
    }
}
