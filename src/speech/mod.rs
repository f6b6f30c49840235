//! Speech output module
//!
//! Every engine implements [`SpeechEngine`], a small state machine over
//! [`SpeechState`]:
//! - Idle: nothing is being spoken
//! - Speaking: an utterance is current and will complete on its own
//! - Paused: an utterance is current but paused
//!
//! `speak` always cancels the current utterance first, silently: a
//! superseded utterance never runs its completion callback.

mod platform;
mod simulated;
mod system;

pub use platform::{PlatformSynthesis, SynthesisBackend};
pub use simulated::{PausePolicy, SimulatedSynthesis};
pub use system::CommandBackend;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::events::SpeechEvent;

/// Shortest simulated utterance
pub const MIN_DURATION: Duration = Duration::from_millis(1000);

/// Average speaking rate (~150 words per minute)
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Characters of an utterance kept in logs and events
const PREVIEW_CHARS: usize = 100;

/// Callback run once when an utterance finishes on its own
pub type OnEnd = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to the engine selected at startup
pub type Speech = Arc<dyn SpeechEngine>;

/// State of a speech engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechState {
    /// Nothing is being spoken
    #[default]
    Idle,
    /// An utterance is current
    Speaking,
    /// The current utterance is paused
    Paused,
}

impl std::fmt::Display for SpeechState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechState::Idle => write!(f, "Idle"),
            SpeechState::Speaking => write!(f, "Speaking"),
            SpeechState::Paused => write!(f, "Paused"),
        }
    }
}

/// Text-to-speech capability shared by the simulated and platform engines
pub trait SpeechEngine: Send + Sync {
    /// Speak `text`, superseding whatever is current.
    ///
    /// `on_end` runs once if the utterance completes uninterrupted. It is
    /// dropped without running when a later `speak` or `stop` supersedes it.
    fn speak(&self, text: &str, on_end: Option<OnEnd>);

    /// Speaking -> Paused; no-op from any other state
    fn pause(&self);

    /// Paused -> Speaking; no-op from any other state
    fn resume(&self);

    /// Cancel the current utterance without running its callback
    fn stop(&self);

    /// Current state
    fn state(&self) -> SpeechState;

    /// Subscribe to state change events
    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent>;
}

/// Number of words, splitting on runs of whitespace
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Simulated speaking time for `text`
pub fn speaking_duration(text: &str) -> Duration {
    let words = word_count(text) as f64;
    let millis = (words / WORDS_PER_SECOND * 1000.0).round() as u64;
    Duration::from_millis(millis).max(MIN_DURATION)
}

/// Text shortened for logs and the speaking indicator
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Speak `text` again from the start.
///
/// Engines have no replay primitive: stop, wait `gap`, speak.
pub async fn replay(speech: &Speech, text: &str, gap: Duration) {
    speech.stop();
    tokio::time::sleep(gap).await;
    speech.speak(text, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_duration() {
        assert_eq!(speaking_duration(""), MIN_DURATION);
        assert_eq!(speaking_duration("hello"), MIN_DURATION);
        assert_eq!(speaking_duration("one two"), MIN_DURATION);
    }

    #[test]
    fn test_duration_scales_with_words() {
        let ten = "word ".repeat(10);
        let twenty = "word ".repeat(20);
        assert_eq!(speaking_duration(&ten), Duration::from_millis(4000));
        assert_eq!(speaking_duration(&twenty), Duration::from_millis(8000));
    }

    #[test]
    fn test_word_count_collapses_whitespace() {
        assert_eq!(word_count("  go\tto \n\n quiz  "), 3);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(150);
        let short = preview(&long);
        assert_eq!(short.len(), 103);
        assert!(short.ends_with("..."));
        assert_eq!(preview("short text"), "short text");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let long = "é".repeat(120);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 103);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_speaks_again() {
        let engine = SimulatedSynthesis::new(PausePolicy::Cosmetic);
        let speech: Speech = Arc::new(engine);
        let mut events = speech.subscribe();

        speech.speak("first words", None);
        replay(&speech, "first words", Duration::from_millis(100)).await;

        assert!(matches!(events.recv().await, Ok(SpeechEvent::Started { .. })));
        assert_eq!(events.recv().await.ok(), Some(SpeechEvent::Stopped));
        assert!(matches!(events.recv().await, Ok(SpeechEvent::Started { .. })));
        assert_eq!(speech.state(), SpeechState::Speaking);
    }
}
