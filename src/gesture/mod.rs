//! Gesture trigger path: frame differencing and palm-hold hysteresis
//!
//! No shape recognition: a deliberate palm hold is detected as one big
//! motion spike followed by a run of stable frames.

mod detector;
mod frame;
mod listener;

pub use detector::{DetectorConfig, PalmDetector};
pub use frame::{motion_magnitude, Frame, FrameError, FrameSource, StillSource};
pub use listener::GestureListener;
