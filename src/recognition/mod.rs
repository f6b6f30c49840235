//! Speech recognition module
//!
//! A recognition session runs Idle -> Listening -> {Result | Error} -> Idle.
//! Recognizers report progress as [`RecognitionEvent`]s on the channel given
//! to `start`; a session always ends with [`RecognitionEvent::Ended`].

mod typed;

pub use typed::TypedRecognizer;

use tokio::sync::mpsc;

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Keep listening after a final result
    pub continuous: bool,
    /// Report partial transcripts while listening
    pub interim_results: bool,
    pub lang: String,
    pub max_alternatives: u8,
}

impl RecognitionOptions {
    /// One final transcript, then the session ends
    pub fn single_command() -> Self {
        Self {
            continuous: false,
            interim_results: false,
            lang: "en-US".to_string(),
            max_alternatives: 1,
        }
    }

    /// Stream of interim and final fragments until stopped
    pub fn dictation() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            lang: "en-US".to_string(),
            max_alternatives: 1,
        }
    }
}

/// A piece of recognized speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub transcript: String,
    pub is_final: bool,
}

impl Fragment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// Progress of a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result(Vec<Fragment>),
    Error(ErrorCode),
    Ended,
}

/// Error codes reported by a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// `not-allowed` or `permission-denied`
    PermissionDenied,
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    Other(String),
}

impl ErrorCode {
    /// Parse a recognizer error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "permission-denied" => ErrorCode::PermissionDenied,
            "no-speech" => ErrorCode::NoSpeech,
            "aborted" => ErrorCode::Aborted,
            "audio-capture" => ErrorCode::AudioCapture,
            "network" => ErrorCode::Network,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::PermissionDenied => ErrorCategory::PermissionDenied,
            ErrorCode::NoSpeech => ErrorCategory::NoInput,
            ErrorCode::Aborted => ErrorCategory::UserAborted,
            ErrorCode::AudioCapture | ErrorCode::Network | ErrorCode::Other(_) => {
                ErrorCategory::Unclassified
            }
        }
    }

    /// User-facing explanation
    pub fn describe(&self) -> String {
        match self {
            ErrorCode::PermissionDenied => "Microphone permission denied. Please allow microphone access in your system settings.".to_string(),
            ErrorCode::NoSpeech => "No speech detected. Please try again.".to_string(),
            ErrorCode::Aborted => "Listening was cancelled.".to_string(),
            ErrorCode::AudioCapture => "No microphone detected. Please connect a microphone.".to_string(),
            ErrorCode::Network => "Network error. Speech recognition requires an internet connection.".to_string(),
            ErrorCode::Other(code) => format!("Speech recognition error: {}", code),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::PermissionDenied => write!(f, "not-allowed"),
            ErrorCode::NoSpeech => write!(f, "no-speech"),
            ErrorCode::Aborted => write!(f, "aborted"),
            ErrorCode::AudioCapture => write!(f, "audio-capture"),
            ErrorCode::Network => write!(f, "network"),
            ErrorCode::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Failure classes of voice input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No recognizer present
    CapabilityAbsent,
    PermissionDenied,
    NoInput,
    UserAborted,
    Unclassified,
}

/// What the user is offered after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Announce the reason, then show the manual picker
    ManualPicker,
    /// Ask the user to try again
    RetryPrompt,
    /// Say nothing
    Silent,
}

impl ErrorCategory {
    pub fn fallback(&self) -> Fallback {
        match self {
            ErrorCategory::CapabilityAbsent
            | ErrorCategory::PermissionDenied
            | ErrorCategory::Unclassified => Fallback::ManualPicker,
            ErrorCategory::NoInput => Fallback::RetryPrompt,
            ErrorCategory::UserAborted => Fallback::Silent,
        }
    }
}

/// Errors starting a session
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("a recognition session is already active")]
    Busy,

    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
}

/// Speech-to-text service: the external collaborator behind voice input
pub trait Recognizer: Send + Sync {
    /// Begin a session, reporting progress on `events`
    fn start(
        &self,
        options: RecognitionOptions,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), RecognitionError>;

    /// Finish the session, delivering what was heard
    fn stop(&self);

    /// Cancel the session; reports `aborted`
    fn abort(&self);

    fn is_active(&self) -> bool;
}

/// Accumulated transcript of a continuous session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    finalized: String,
    interim: String,
}

impl TranscriptBuffer {
    /// Apply one result batch: finals are appended, interim text replaced
    pub fn apply(&mut self, fragments: &[Fragment]) {
        let mut interim = String::new();
        for fragment in fragments {
            if fragment.is_final {
                self.finalized.push_str(&fragment.transcript);
                self.finalized.push(' ');
            } else {
                interim.push_str(&fragment.transcript);
            }
        }
        self.interim = interim;
    }

    /// Finalized text
    pub fn transcript(&self) -> &str {
        self.finalized.trim_end()
    }

    /// Text not yet finalized
    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn reset(&mut self) {
        self.finalized.clear();
        self.interim.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::from_code("not-allowed"), ErrorCode::PermissionDenied);
        assert_eq!(ErrorCode::from_code("permission-denied"), ErrorCode::PermissionDenied);
        assert_eq!(ErrorCode::from_code("no-speech"), ErrorCode::NoSpeech);
        assert_eq!(
            ErrorCode::from_code("service-not-allowed"),
            ErrorCode::Other("service-not-allowed".to_string())
        );
    }

    #[test]
    fn test_fallback_policy() {
        assert_eq!(
            ErrorCode::PermissionDenied.category().fallback(),
            Fallback::ManualPicker
        );
        assert_eq!(ErrorCode::NoSpeech.category().fallback(), Fallback::RetryPrompt);
        assert_eq!(ErrorCode::Aborted.category().fallback(), Fallback::Silent);
        assert_eq!(ErrorCode::Network.category().fallback(), Fallback::ManualPicker);
        assert_eq!(
            ErrorCategory::CapabilityAbsent.fallback(),
            Fallback::ManualPicker
        );
    }

    #[test]
    fn test_describe_mentions_permission() {
        assert!(ErrorCode::PermissionDenied.describe().contains("permission"));
        assert!(ErrorCode::Other("bad-grammar".to_string())
            .describe()
            .contains("bad-grammar"));
    }

    #[test]
    fn test_transcript_buffer() {
        let mut buffer = TranscriptBuffer::default();

        buffer.apply(&[Fragment::interim("what is")]);
        assert_eq!(buffer.transcript(), "");
        assert_eq!(buffer.interim(), "what is");

        buffer.apply(&[Fragment::final_("what is braille"), Fragment::interim("and how")]);
        assert_eq!(buffer.transcript(), "what is braille");
        assert_eq!(buffer.interim(), "and how");

        buffer.apply(&[Fragment::final_("and how is it read")]);
        assert_eq!(buffer.transcript(), "what is braille and how is it read");
        assert_eq!(buffer.interim(), "");

        buffer.reset();
        assert_eq!(buffer.transcript(), "");
    }
}
