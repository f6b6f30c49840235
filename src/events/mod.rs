//! Events module for speech and navigation state changes
//!
//! Subscribers (the speaking indicator, the JSON event printer) observe the
//! engine through these typed events rather than through log output.

use serde::{Deserialize, Serialize};

use crate::state::Module;

/// Events emitted by a speech engine as its state changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeechEvent {
    /// An utterance became current
    Started {
        /// Text truncated for display
        text: String,
        /// Expected speaking time, when the engine knows it
        duration_ms: Option<u64>,
    },

    /// Speaking was paused
    Paused,

    /// Speaking was resumed after a pause
    Resumed,

    /// The current utterance finished on its own
    Finished,

    /// The current utterance was stopped before finishing
    Stopped,

    /// The backend reported an unexpected error for the current utterance
    Failed {
        /// Backend error code
        code: String,
    },
}

impl std::fmt::Display for SpeechEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechEvent::Started {
                text,
                duration_ms: Some(ms),
            } => write!(f, "SPEAKING (~{}s): {}", (ms + 500) / 1000, text),
            SpeechEvent::Started { text, .. } => write!(f, "SPEAKING: {}", text),
            SpeechEvent::Paused => write!(f, "PAUSED"),
            SpeechEvent::Resumed => write!(f, "RESUMED"),
            SpeechEvent::Finished => write!(f, "FINISHED"),
            SpeechEvent::Stopped => write!(f, "STOPPED"),
            SpeechEvent::Failed { code } => write!(f, "FAILED ({})", code),
        }
    }
}

/// Events emitted by the navigator on module transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    /// A module became current
    ModuleEntered { module: Module },

    /// The previous module was left
    ModuleExited {
        module: Module,
        /// Duration in milliseconds the module was current
        duration_ms: u64,
    },
}

impl std::fmt::Display for NavigationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationEvent::ModuleEntered { module } => write!(f, "ENTERED {}", module),
            NavigationEvent::ModuleExited {
                module,
                duration_ms,
            } => write!(f, "EXITED {} ({}ms)", module, duration_ms),
        }
    }
}
