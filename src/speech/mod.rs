//! Speech I/O: recognition and synthesis seams, plus the coordinator
//!
//! The platform services live behind [`RecognitionService`] and
//! [`SynthesisService`] so backends can be swapped (and faked in tests). The
//! [`SpeechCoordinator`] owns the one continuous session and guarantees the
//! system never hears itself talk.

mod console;
mod coordinator;

use tokio::sync::oneshot;

pub use console::{StdinRecognizer, StdoutSynthesizer};
pub use coordinator::{SpeechCommand, SpeechCoordinator, SpeechHandle};

/// Asynchronous events delivered by a recognition service.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// The underlying session is running.
    Started,
    /// One final recognized phrase.
    Result { text: String },
    /// The session hit an error.
    Error { kind: RecognitionErrorKind },
    /// The session ended on its own (platform-initiated).
    Ended,
}

/// Error classes a recognition service can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone access denied: fatal, no restart possible.
    PermissionDenied,
    /// No speech was detected before the service gave up.
    NoSpeech,
    /// The session was aborted by the platform.
    Aborted,
    /// Anything else; treated as recoverable.
    Other,
}

impl RecognitionErrorKind {
    /// Fatal errors end the voice trigger path for the process lifetime.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognitionErrorKind::PermissionDenied)
    }
}

/// Errors from driving a speech service
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to start recognition session: {0}")]
    StartFailed(String),
}

/// A continuous speech-recognition session.
///
/// The implementation delivers [`RecognitionEvent`]s on the mpsc channel it
/// was constructed with; the coordinator owns lifecycle and restart policy.
pub trait RecognitionService: Send {
    fn start(&mut self) -> Result<(), SpeechError>;
    fn stop(&mut self);
}

/// A text-to-speech output channel.
///
/// Completion and failure are reported identically: fire the sender on
/// playback end, or drop it on failure. The coordinator treats both the same
/// for unmute timing.
pub trait SynthesisService: Send {
    fn speak(&mut self, text: &str, done: oneshot::Sender<()>);
}
