//! Console stand-ins for the platform speech services
//!
//! The daemon's recognition and synthesis backends are external services;
//! these adapters let the binary run end-to-end without them. One stdin line
//! is one final recognition result; synthesis prints to stdout and completes
//! immediately. The coordinator drives them exactly like real services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{RecognitionErrorKind, RecognitionEvent, RecognitionService, SpeechError, SynthesisService};

/// Reads stdin lines as recognized phrases.
pub struct StdinRecognizer {
    event_tx: mpsc::Sender<RecognitionEvent>,
    task: Option<JoinHandle<()>>,
    /// Once stdin hits EOF there is nothing left to read; later restarts
    /// become silent no-ops instead of an EOF/restart churn loop.
    exhausted: Arc<AtomicBool>,
}

impl StdinRecognizer {
    pub fn new(event_tx: mpsc::Sender<RecognitionEvent>) -> Self {
        Self {
            event_tx,
            task: None,
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl RecognitionService for StdinRecognizer {
    fn start(&mut self) -> Result<(), SpeechError> {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        if self.exhausted.load(Ordering::SeqCst) {
            debug!("stdin exhausted, session stays silent");
            return Ok(());
        }

        let event_tx = self.event_tx.clone();
        let exhausted = Arc::clone(&self.exhausted);
        self.task = Some(tokio::spawn(async move {
            let _ = event_tx.send(RecognitionEvent::Started).await;

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(text)) => {
                        if event_tx.send(RecognitionEvent::Result { text }).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        exhausted.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "stdin read failed");
                        let _ = event_tx
                            .send(RecognitionEvent::Error {
                                kind: RecognitionErrorKind::Other,
                            })
                            .await;
                        break;
                    }
                }
            }

            let _ = event_tx.send(RecognitionEvent::Ended).await;
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Prints phrases to stdout and completes immediately.
pub struct StdoutSynthesizer;

impl SynthesisService for StdoutSynthesizer {
    fn speak(&mut self, text: &str, done: oneshot::Sender<()>) {
        println!("[beckon] {}", text);
        let _ = done.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_synthesizer_completes() {
        let (done_tx, done_rx) = oneshot::channel();
        StdoutSynthesizer.speak("hello", done_tx);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_recognizer_start_is_idempotent() {
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let mut recognizer = StdinRecognizer::new(event_tx);

        recognizer.start().unwrap();
        recognizer.start().unwrap();

        // Exactly one session announced itself.
        assert!(matches!(
            event_rx.recv().await,
            Some(RecognitionEvent::Started)
        ));
        recognizer.stop();
    }
}
