//! Tick-driven gesture listener
//!
//! Captures one frame per tick, classifies it only while the engine is Idle,
//! and forwards confirmed palm holds to the activation machine. A denied
//! camera permission kills this task only; the voice path keeps running.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::activation::ActivationState;
use crate::events::{CoreEvent, TriggerSource};

use super::detector::PalmDetector;
use super::frame::{FrameError, FrameSource};

/// Frame cadence; stands in for the display refresh callback.
const DEFAULT_TICK: Duration = Duration::from_millis(33);

/// Owns the frame source and the detector, feeding the machine over mpsc.
pub struct GestureListener {
    source: Box<dyn FrameSource>,
    detector: PalmDetector,
    core_tx: mpsc::Sender<CoreEvent>,
    state_rx: watch::Receiver<ActivationState>,
    tick: Duration,
}

impl GestureListener {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: PalmDetector,
        core_tx: mpsc::Sender<CoreEvent>,
        state_rx: watch::Receiver<ActivationState>,
    ) -> Self {
        Self {
            source,
            detector,
            core_tx,
            state_rx,
            tick: DEFAULT_TICK,
        }
    }

    /// Run the capture loop until the camera dies or the engine goes away.
    pub async fn run(mut self) {
        info!("gesture listener started");

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let frame = match self.source.capture() {
                Ok(frame) => frame,
                Err(FrameError::PermissionDenied) => {
                    error!("camera permission denied; gesture trigger disabled");
                    break;
                }
                Err(e) => {
                    warn!(?e, "frame capture failed, skipping tick");
                    continue;
                }
            };

            let classify = *self.state_rx.borrow() == ActivationState::Idle;
            if self.detector.observe(frame, Instant::now(), classify) {
                let event = CoreEvent::Trigger {
                    source: TriggerSource::Gesture,
                    at: Instant::now(),
                };
                if self.core_tx.send(event).await.is_err() {
                    break;
                }
            }
        }

        info!("gesture listener stopped");
    }
}
