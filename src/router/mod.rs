//! Command routing: keyword rules to actions
//!
//! A captured command is free-form text; routing is an ordered list of
//! (keywords, action) rules evaluated first-match-wins, with a spoken
//! fallback when nothing matches. Rules stay declarative so the table can
//! grow without touching the engine's control flow.

use std::process::Command;

use chrono::Local;
use tracing::{info, warn};

use crate::speech::SpeechHandle;

/// Destination for a captured command. Invoked at most once per command,
/// after the engine has returned to Idle.
pub trait CommandRouter: Send {
    fn handle(&mut self, command: &str);
}

/// What a matched rule does.
#[derive(Debug, Clone)]
enum Action {
    /// Open a resource and confirm it out loud.
    Open { label: &'static str, url: &'static str },
    /// Speak the current wall-clock time.
    CurrentTime,
    /// Speak today's date.
    CurrentDate,
    /// Speak a summary of what can be asked.
    Help,
}

/// One routing rule: match if the command contains any keyword.
struct Rule {
    keywords: &'static [&'static str],
    action: Action,
}

/// Launches URLs; seam so tests never spawn processes.
pub trait ResourceOpener: Send {
    fn open(&mut self, url: &str);
}

/// Hands the URL to the desktop via `xdg-open` (or `open` on macOS).
pub struct ShellOpener;

impl ResourceOpener for ShellOpener {
    fn open(&mut self, url: &str) {
        #[cfg(target_os = "macos")]
        let program = "open";
        #[cfg(not(target_os = "macos"))]
        let program = "xdg-open";

        if let Err(e) = Command::new(program).arg(url).spawn() {
            warn!(?e, url, "failed to open resource");
        }
    }
}

/// The default rule table, evaluated top to bottom.
const RULES: &[Rule] = &[
    Rule {
        keywords: &["music", "song"],
        action: Action::Open {
            label: "music",
            url: "https://music.youtube.com",
        },
    },
    Rule {
        keywords: &["video", "youtube"],
        action: Action::Open {
            label: "YouTube",
            url: "https://www.youtube.com",
        },
    },
    Rule {
        keywords: &["news", "headlines"],
        action: Action::Open {
            label: "the news",
            url: "https://news.google.com",
        },
    },
    Rule {
        keywords: &["search", "google"],
        action: Action::Open {
            label: "search",
            url: "https://www.google.com",
        },
    },
    Rule {
        keywords: &["time", "clock"],
        action: Action::CurrentTime,
    },
    Rule {
        keywords: &["date", "day", "today"],
        action: Action::CurrentDate,
    },
    Rule {
        keywords: &["help", "what can you do"],
        action: Action::Help,
    },
];

/// First-match-wins router over the declarative rule table.
pub struct RuleRouter {
    speech: SpeechHandle,
    opener: Box<dyn ResourceOpener>,
}

impl RuleRouter {
    pub fn new(speech: SpeechHandle, opener: Box<dyn ResourceOpener>) -> Self {
        Self { speech, opener }
    }

    fn run_action(&mut self, action: Action) {
        match action {
            Action::Open { label, url } => {
                self.speech.speak(format!("Opening {}.", label));
                self.opener.open(url);
            }
            Action::CurrentTime => {
                let now = Local::now();
                self.speech
                    .speak(format!("It is {}.", now.format("%-I:%M %p")));
            }
            Action::CurrentDate => {
                let today = Local::now();
                self.speech
                    .speak(format!("Today is {}.", today.format("%A, %B %-e")));
            }
            Action::Help => {
                self.speech.speak(
                    "You can ask me to open music, videos, news or search, \
                     or ask for the time or the date.",
                );
            }
        }
    }
}

impl CommandRouter for RuleRouter {
    fn handle(&mut self, command: &str) {
        for rule in RULES {
            if rule.keywords.iter().any(|keyword| command.contains(keyword)) {
                info!(command, action = ?rule.action, "command matched");
                self.run_action(rule.action.clone());
                return;
            }
        }

        info!(command, "no rule matched");
        self.speech
            .speak("Sorry, I didn't catch that. Say help to hear what I can do.");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;
    use crate::speech::SpeechCommand;

    struct RecordingOpener {
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl ResourceOpener for RecordingOpener {
        fn open(&mut self, url: &str) {
            self.opened.lock().unwrap().push(url.to_string());
        }
    }

    fn router() -> (
        RuleRouter,
        mpsc::Receiver<SpeechCommand>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let (speech_tx, speech_rx) = mpsc::channel(8);
        let opened = Arc::new(Mutex::new(Vec::new()));
        let router = RuleRouter::new(
            SpeechHandle::new(speech_tx),
            Box::new(RecordingOpener {
                opened: Arc::clone(&opened),
            }),
        );
        (router, speech_rx, opened)
    }

    fn spoken(rx: &mut mpsc::Receiver<SpeechCommand>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(SpeechCommand::Speak { text }) = rx.try_recv() {
            texts.push(text);
        }
        texts
    }

    #[test]
    fn test_open_rule_speaks_and_opens() {
        let (mut router, mut speech_rx, opened) = router();
        router.handle("open music please");

        assert_eq!(spoken(&mut speech_rx), vec!["Opening music."]);
        assert_eq!(*opened.lock().unwrap(), ["https://music.youtube.com"]);
    }

    #[test]
    fn test_first_match_wins() {
        let (mut router, mut speech_rx, opened) = router();
        // Matches both the music and the youtube rule; table order decides.
        router.handle("play a music video");

        assert_eq!(spoken(&mut speech_rx), vec!["Opening music."]);
        assert_eq!(opened.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_time_rule_speaks_a_time() {
        let (mut router, mut speech_rx, opened) = router();
        router.handle("what time is it");

        let texts = spoken(&mut speech_rx);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("It is "));
        assert!(opened.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_always_answers() {
        let (mut router, mut speech_rx, opened) = router();
        router.handle("gibberish nobody planned for");

        let texts = spoken(&mut speech_rx);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Sorry"));
        assert!(opened.lock().unwrap().is_empty());
    }

    #[test]
    fn test_every_command_gets_exactly_one_reply() {
        for command in ["open news", "what day is it", "help", "zzz"] {
            let (mut router, mut speech_rx, _) = router();
            router.handle(command);
            assert_eq!(spoken(&mut speech_rx).len(), 1, "command {:?}", command);
        }
    }
}
