//! Frame capture seam and motion arithmetic
//!
//! The detector consumes 8-bit luminance frames from a [`FrameSource`], one
//! per listener tick. Motion between consecutive frames is the sum of
//! absolute per-sample deltas, sub-sampled for cost, scaled down to
//! "k-units" so the detector thresholds stay in small integers.

/// How many raw delta units make one k-unit.
const KILO: u64 = 1000;

/// A single captured frame as an 8-bit luminance plane.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, luma: Vec<u8>) -> Result<Self, FrameError> {
        if luma.len() != (width as usize) * (height as usize) {
            return Err(FrameError::BadDimensions {
                width,
                height,
                samples: luma.len(),
            });
        }
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.luma
    }
}

/// Errors from a frame source or frame construction
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("frame source unavailable: {0}")]
    Unavailable(String),

    #[error("luma plane of {samples} samples does not match {width}x{height}")]
    BadDimensions {
        width: u32,
        height: u32,
        samples: usize,
    },
}

/// Produces a lazy, infinite sequence of frames; called once per tick.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, FrameError>;
}

/// Motion magnitude between two frames in k-units.
///
/// Sums |delta| over every `stride`-th sample. Frames of mismatched size are
/// compared over the shorter plane.
pub fn motion_magnitude(prev: &Frame, current: &Frame, stride: usize) -> u32 {
    let stride = stride.max(1);
    let raw: u64 = prev
        .samples()
        .iter()
        .zip(current.samples())
        .step_by(stride)
        .map(|(a, b)| a.abs_diff(*b) as u64)
        .sum();
    (raw / KILO) as u32
}

/// Constant-luminance source: a stand-in until a capture backend is wired.
/// Never produces motion, so the voice path is the sole trigger.
pub struct StillSource {
    frame: Frame,
}

impl StillSource {
    pub fn new(width: u32, height: u32) -> Self {
        let luma = vec![0x80; (width as usize) * (height as usize)];
        Self {
            frame: Frame::new(width, height, luma).expect("sized to match"),
        }
    }
}

impl FrameSource for StillSource {
    fn capture(&mut self) -> Result<Frame, FrameError> {
        Ok(self.frame.clone())
    }
}
