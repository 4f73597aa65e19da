//! beckon-daemon: hands-free activation front-end
//!
//! Listens for a spoken wake phrase or a held-palm gesture, greets, then
//! interprets a single spoken utterance as a command:
//! - Explicit state machine: Dormant, Idle, Activated, ListeningForCommand
//! - Two trigger detectors behind one global cooldown gate
//! - Self-muting speech coordinator so the daemon never hears itself talk
//! - Unix-socket status IPC for shells and UIs

mod activation;
mod config;
mod events;
mod gesture;
mod ipc;
mod lifecycle;
mod router;
mod speech;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::activation::{ActivationMachine, ActivationState};
use crate::config::Config;
use crate::events::{CoreEvent, StateEvent};
use crate::gesture::{GestureListener, PalmDetector, StillSource};
use crate::ipc::{Phase, Server};
use crate::router::{RuleRouter, ShellOpener};
use crate::speech::{SpeechCoordinator, StdinRecognizer, StdoutSynthesizer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "beckon-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, wake_word = %config.wake_word, "configuration loaded");

    // Channels for inter-component communication
    // Detectors and coordinator -> activation machine
    let (core_tx, core_rx) = mpsc::channel::<CoreEvent>(64);
    // Machine -> status subscribers
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);
    // Machine -> detector/coordinator state fan-out
    let (state_tx, state_rx) = watch::channel(ActivationState::Dormant);
    // Recognition service -> coordinator
    let (recognition_tx, recognition_rx) = mpsc::channel(32);

    // Speech coordinator owns the one recognition session
    let (coordinator, speech, mut listening_rx) = SpeechCoordinator::new(
        Box::new(StdinRecognizer::new(recognition_tx)),
        Box::new(StdoutSynthesizer),
        recognition_rx,
        core_tx.clone(),
        state_rx.clone(),
        event_tx.clone(),
    );
    tokio::spawn(coordinator.run());

    // Gesture listener feeds confirmed palm holds into the machine
    let gesture_listener = GestureListener::new(
        Box::new(StillSource::new(320, 240)),
        PalmDetector::default(),
        core_tx.clone(),
        state_rx,
    );
    tokio::spawn(gesture_listener.run());

    // The activation machine and its command router
    let router = RuleRouter::new(speech.clone(), Box::new(ShellOpener));
    let mut machine = ActivationMachine::new(
        config.wake_word.clone(),
        speech,
        Box::new(router),
        event_tx.clone(),
        state_tx,
        core_tx.clone(),
    );

    // Status IPC server
    let server = Server::new(&config.socket_path, event_tx.clone())?;

    // Start the engine: Dormant -> Idle, detectors live
    core_tx
        .send(CoreEvent::Start {
            user_name: config.user_name.clone(),
        })
        .await?;

    info!("daemon initialized, entering main loop");

    let mut status_event_rx = event_tx.subscribe();

    // Main event loop
    tokio::select! {
        // Run the activation machine (processes trigger and utterance events)
        _ = machine.run(core_rx) => {
            info!("activation engine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status view in sync with the engine
        _ = async {
            loop {
                tokio::select! {
                    event = status_event_rx.recv() => match event {
                        Ok(event) => {
                            info!(%event, "state event");
                            let phase = match &event {
                                StateEvent::SystemStarted
                                | StateEvent::CommandDispatched { .. } => Some(Phase::Idle),
                                StateEvent::Activated { .. } => Some(Phase::Activated),
                                StateEvent::CommandWindowOpened => {
                                    Some(Phase::ListeningForCommand)
                                }
                                StateEvent::ActivationBlocked { .. }
                                | StateEvent::RecognitionLost => None,
                            };
                            if let Some(phase) = phase {
                                server.set_phase(phase).await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "state event receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = listening_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let listening = *listening_rx.borrow();
                        server.set_listening(listening).await;
                    }
                }
            }
        } => {
            info!("status sync exited");
        }

        // Wait for shutdown signal
        _ = lifecycle::wait_for_shutdown() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");
    server.shutdown().await;
    info!("beckon-daemon stopped");

    Ok(())
}
