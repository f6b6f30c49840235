//! Configuration loading and management

use std::time::Duration;

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};

use crate::speech::PausePolicy;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "voice-learn", version, about = "Voice-first learning assistant for the terminal")]
pub struct Cli {
    /// Speech output engine
    #[arg(long, value_enum, default_value_t = SynthesisKind::Simulated, env = "VOICE_LEARN_SYNTHESIS")]
    pub synthesis: SynthesisKind,

    /// Program used by the system speech engine
    #[arg(long, default_value = "espeak-ng", env = "VOICE_LEARN_TTS_PROGRAM")]
    pub tts_program: String,

    /// What pausing does to simulated speech
    #[arg(long, value_enum, default_value_t = PausePolicy::Cosmetic, env = "VOICE_LEARN_PAUSE_POLICY")]
    pub pause_policy: PausePolicy,

    /// Run without a speech recognizer (voice commands use the manual picker)
    #[arg(long, env = "VOICE_LEARN_NO_RECOGNITION")]
    pub no_recognition: bool,

    /// Seconds of silence before listening gives up
    #[arg(long, default_value_t = 8, env = "VOICE_LEARN_SILENCE_TIMEOUT")]
    pub silence_timeout: u64,

    /// How speech and navigation events are printed
    #[arg(long, value_enum, default_value_t = EventFormat::Text, env = "VOICE_LEARN_EVENTS")]
    pub events: EventFormat,
}

/// Which speech engine to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthesisKind {
    /// Timer-based engine that never produces audio
    Simulated,
    /// System text-to-speech program
    System,
}

/// Output style of the event display
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    /// Human-readable banner lines
    Text,
    /// One JSON object per event
    Json,
    /// Overlays only
    Off,
}

/// Fixed delays used by the command flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// From "Navigating to ..." to the actual navigation
    pub navigate_delay: Duration,
    /// From entering a module to its announcement
    pub announce_delay: Duration,
    /// From the permission guidance to the manual picker
    pub permission_picker_delay: Duration,
    /// From a generic recognition failure to the manual picker
    pub error_picker_delay: Duration,
    /// Simulated time to answer a document question
    pub answer_delay: Duration,
    /// Pause between stop and speak when replaying
    pub replay_gap: Duration,
    /// From a topic announcement to the topic itself
    pub topic_delay: Duration,
    /// From quiz feedback to the spoken key hint
    pub hint_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            navigate_delay: Duration::from_millis(500),
            announce_delay: Duration::from_millis(500),
            permission_picker_delay: Duration::from_millis(1500),
            error_picker_delay: Duration::from_millis(1000),
            answer_delay: Duration::from_millis(2000),
            replay_gap: Duration::from_millis(100),
            topic_delay: Duration::from_millis(500),
            hint_delay: Duration::from_millis(1000),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub synthesis: SynthesisKind,
    pub tts_program: String,
    pub pause_policy: PausePolicy,
    /// Whether a recognizer is offered to the command dispatcher
    pub recognition: bool,
    pub silence_timeout: Duration,
    pub events: EventFormat,
    pub timings: Timings,
}

impl Config {
    /// Load configuration from the command line, environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    /// Validate parsed arguments
    pub fn from_cli(cli: Cli) -> Result<Self> {
        ensure!(cli.silence_timeout > 0, "--silence-timeout must be at least 1 second");
        ensure!(!cli.tts_program.trim().is_empty(), "--tts-program must not be empty");

        Ok(Self {
            synthesis: cli.synthesis,
            tts_program: cli.tts_program,
            pause_policy: cli.pause_policy,
            recognition: !cli.no_recognition,
            silence_timeout: Duration::from_secs(cli.silence_timeout),
            events: cli.events,
            timings: Timings::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cli = Cli::try_parse_from(["voice-learn"]).unwrap();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.synthesis, SynthesisKind::Simulated);
        assert_eq!(config.pause_policy, PausePolicy::Cosmetic);
        assert!(config.recognition);
        assert_eq!(config.silence_timeout, Duration::from_secs(8));
        assert_eq!(config.timings.navigate_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_config_flags() {
        let cli = Cli::try_parse_from([
            "voice-learn",
            "--synthesis",
            "system",
            "--pause-policy",
            "suspend",
            "--no-recognition",
            "--events",
            "json",
        ])
        .unwrap();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.synthesis, SynthesisKind::System);
        assert_eq!(config.pause_policy, PausePolicy::Suspend);
        assert!(!config.recognition);
        assert_eq!(config.events, EventFormat::Json);
    }

    #[test]
    fn test_zero_silence_timeout_rejected() {
        let cli = Cli::try_parse_from(["voice-learn", "--silence-timeout", "0"]).unwrap();
        assert!(Config::from_cli(cli).is_err());
    }
}
