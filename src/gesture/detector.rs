//! Palm-hold detection by frame-differencing hysteresis
//!
//! The pattern is "big motion then stillness": a palm entering the frame
//! produces a large motion spike, holding it still produces a run of
//! low-motion frames. Requiring both phases rejects ambient motion, which is
//! either continuously variable or brief, without any shape recognition.

use std::time::{Duration, Instant};

use tracing::debug;

use super::frame::{motion_magnitude, Frame};

/// Thresholds for the hysteresis state machine, in k-units of motion.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Arming threshold: magnitude at or above this is "big motion".
    pub motion_threshold: u32,
    /// Stability band: magnitude below this counts toward confirmation.
    pub stable_threshold: u32,
    /// Near-zero band: frames at or above this refresh the abandon clock.
    pub quiet_threshold: u32,
    /// Consecutive stable frames required to confirm a hold.
    pub stable_frames_required: u32,
    /// Armed with nothing but near-zero motion for this long: give up.
    pub abandon_after: Duration,
    /// Visit every Nth luminance sample when differencing.
    pub sample_stride: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 3000,
            stable_threshold: 400,
            quiet_threshold: 100,
            stable_frames_required: 20,
            abandon_after: Duration::from_secs(3),
            sample_stride: 10,
        }
    }
}

/// Hysteresis state over successive frames.
///
/// `armed` means a big motion was seen and we are watching for stillness.
/// The stable count only grows while armed and below the stability band;
/// anything in between resets it without disarming.
pub struct PalmDetector {
    config: DetectorConfig,
    prev_frame: Option<Frame>,
    armed: bool,
    stable_frames: u32,
    /// Last frame at or above the quiet threshold. Abandon eligibility is
    /// recomputed from this on every frame, never from a scheduled capture.
    last_loud_at: Option<Instant>,
}

impl PalmDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            prev_frame: None,
            armed: false,
            stable_frames: 0,
            last_loud_at: None,
        }
    }

    /// Feed one frame. Returns true exactly when a palm hold is confirmed.
    ///
    /// With `classify` false (the engine is not Idle) the frame is buffered
    /// as the new reference and nothing else happens, so no triggers can
    /// form while the system is already activated.
    pub fn observe(&mut self, frame: Frame, now: Instant, classify: bool) -> bool {
        let Some(prev) = self.prev_frame.replace(frame) else {
            return false;
        };

        if !classify {
            return false;
        }

        let current = self.prev_frame.as_ref().expect("frame just stored");
        let magnitude = motion_magnitude(&prev, current, self.config.sample_stride);
        self.classify(magnitude, now)
    }

    /// The hysteresis policy against one motion magnitude.
    pub fn classify(&mut self, magnitude: u32, now: Instant) -> bool {
        // Sustained near-zero motion with no renewed big motion: the hold
        // was abandoned. Checked against the clock before this frame can
        // refresh it, so a late loud frame re-arms rather than resurrects.
        if self.armed {
            if let Some(last_loud) = self.last_loud_at {
                if now.saturating_duration_since(last_loud) >= self.config.abandon_after {
                    debug!("palm hold abandoned, disarming");
                    self.disarm();
                }
            }
        }

        if magnitude >= self.config.quiet_threshold {
            self.last_loud_at = Some(now);
        }

        if magnitude >= self.config.motion_threshold {
            // Palm entering the frame, or motion continuing: (re)arm.
            if !self.armed {
                debug!(magnitude, "big motion, arming");
            }
            self.armed = true;
            self.stable_frames = 0;
            return false;
        }

        if !self.armed {
            return false;
        }

        if magnitude < self.config.stable_threshold {
            self.stable_frames += 1;
            if self.stable_frames >= self.config.stable_frames_required {
                debug!(frames = self.stable_frames, "palm hold confirmed");
                self.disarm();
                return true;
            }
            return false;
        }

        // Between the bands: noise, not cancellation.
        self.stable_frames = 0;
        false
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.stable_frames = 0;
    }
}

impl Default for PalmDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
