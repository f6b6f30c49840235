//! Voice command dispatcher
//!
//! Turns key shortcuts and recognized transcripts into navigation, the help
//! overlay or the manual command picker. Voice input failures never leave the
//! user stuck: every path that cannot listen ends at the picker.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::table::{normalize, CommandTable, Route, QUICK_COMMANDS};
use crate::config::Timings;
use crate::hotkey::Shortcut;
use crate::recognition::{
    ErrorCategory, ErrorCode, Fallback, RecognitionEvent, RecognitionOptions, Recognizer,
};
use crate::scheduler::{Deferred, Scheduler};
use crate::speech::Speech;

const HELP_SUMMARY: &str = "Showing voice commands help. You can say commands like: go to document upload, go to braille evaluation, take quiz, or go to history lessons.";
const HELP_KEY: &str = "Showing keyboard shortcuts and voice commands help";
const NOT_RECOGNIZED: &str = "Command not recognized. Say \"help\" to hear available commands.";
const LISTENING: &str = "Listening for command. Please speak now.";
const NO_RECOGNIZER: &str =
    "Voice recognition not supported on this system. Showing command menu instead.";
const PERMISSION_GUIDANCE: &str = "Microphone permission denied. Please allow microphone access in your system settings, or use keyboard shortcuts instead. Showing command menu.";
const PERMISSION_REMINDER: &str =
    "Microphone permission was denied. Use keyboard shortcuts or the command menu instead.";
const NO_SPEECH: &str = "No speech detected. Please try again.";
const RECOGNITION_FAILED: &str = "Voice recognition error. Showing command menu instead.";
const START_FAILED: &str = "Could not start voice commands. Showing command menu instead.";

/// Result of processing one transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Navigation to `Route` was scheduled
    Navigating(Route),
    /// The help overlay was opened
    Help,
    NotRecognized,
}

/// Observable dispatcher state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    /// A voice command session is running
    pub listening: bool,
    pub help_open: bool,
    pub picker_open: bool,
    /// The recognizer refused microphone access earlier
    pub permission_denied: bool,
    /// Normalized text of the last processed command
    pub last_command: Option<String>,
}

/// Routes voice commands and shortcuts
pub struct Dispatcher {
    table: CommandTable,
    speech: Speech,
    recognizer: Option<Arc<dyn Recognizer>>,
    recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
    scheduler: Scheduler,
    timings: Timings,
    status: DispatcherStatus,
    status_tx: watch::Sender<DispatcherStatus>,
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// Session events from `recognizer` arrive on `recognition_tx`; the owner
    /// of the matching receiver hands them back through
    /// [`Dispatcher::handle_recognition`].
    pub fn new(
        table: CommandTable,
        speech: Speech,
        recognizer: Option<Arc<dyn Recognizer>>,
        recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
        scheduler: Scheduler,
        timings: Timings,
    ) -> Self {
        let (status_tx, _) = watch::channel(DispatcherStatus::default());
        Self {
            table,
            speech,
            recognizer,
            recognition_tx,
            scheduler,
            timings,
            status: DispatcherStatus::default(),
            status_tx,
        }
    }

    /// Current status
    pub fn status(&self) -> &DispatcherStatus {
        &self.status
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<DispatcherStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    fn say(&self, text: &str) {
        self.speech.speak(text, None);
    }

    /// Interpret a transcript against the command table
    pub fn process_command(&mut self, transcript: &str) -> CommandOutcome {
        let command = normalize(transcript);
        info!(command = %command, "processing voice command");
        self.status.last_command = Some(command.clone());

        let matched = self
            .table
            .find(&command)
            .map(|(phrase, route)| (phrase.to_string(), route));

        let outcome = match matched {
            Some((_, Route::Help)) => {
                self.status.help_open = true;
                self.say(HELP_SUMMARY);
                CommandOutcome::Help
            }
            Some((phrase, route)) => {
                self.say(&format!("Navigating to {}", phrase));
                self.scheduler
                    .after(self.timings.navigate_delay, Deferred::Navigate(route));
                CommandOutcome::Navigating(route)
            }
            None => {
                debug!(command = %command, "no phrase matched");
                self.say(NOT_RECOGNIZED);
                CommandOutcome::NotRecognized
            }
        };

        self.publish();
        outcome
    }

    /// Begin listening for a single spoken command
    pub fn start_voice_command(&mut self) {
        if self.status.listening {
            debug!("voice command already listening");
            return;
        }

        let Some(recognizer) = self.recognizer.clone() else {
            info!(category = ?ErrorCategory::CapabilityAbsent, "no speech recognizer");
            self.say(NO_RECOGNIZER);
            self.open_picker();
            return;
        };

        if self.status.permission_denied {
            info!("microphone permission denied earlier, skipping recognizer");
            self.say(PERMISSION_REMINDER);
            self.open_picker();
            return;
        }

        match recognizer.start(
            RecognitionOptions::single_command(),
            self.recognition_tx.clone(),
        ) {
            Ok(()) => {
                self.status.listening = true;
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "failed to start voice command");
                self.say(START_FAILED);
                self.open_picker();
            }
        }
    }

    /// Apply a recognition session event
    pub fn handle_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                info!("listening for voice command");
                self.say(LISTENING);
            }
            RecognitionEvent::Result(fragments) => {
                if let Some(fragment) = fragments.first() {
                    let transcript = fragment.transcript.clone();
                    self.process_command(&transcript);
                }
            }
            RecognitionEvent::Error(code) => {
                self.status.listening = false;
                self.recognition_failed(&code);
                self.publish();
            }
            RecognitionEvent::Ended => {
                debug!("voice command session ended");
                self.status.listening = false;
                self.publish();
            }
        }
    }

    fn recognition_failed(&mut self, code: &ErrorCode) {
        let category = code.category();
        match category.fallback() {
            Fallback::Silent => debug!(code = %code, "voice command cancelled"),
            Fallback::RetryPrompt => {
                info!(code = %code, "no speech heard");
                self.say(NO_SPEECH);
            }
            Fallback::ManualPicker => {
                let (message, delay) = if category == ErrorCategory::PermissionDenied {
                    self.status.permission_denied = true;
                    (PERMISSION_GUIDANCE, self.timings.permission_picker_delay)
                } else {
                    (RECOGNITION_FAILED, self.timings.error_picker_delay)
                };
                warn!(code = %code, ?category, "voice recognition failed");
                self.say(message);
                self.scheduler.after(delay, Deferred::OpenPicker);
            }
        }
    }

    /// Show the manual command picker
    pub fn open_picker(&mut self) {
        if !self.status.picker_open {
            info!("opening command picker");
        }
        self.status.picker_open = true;
        self.publish();
    }

    /// Run the picker entry at `index` (zero-based) and close the picker
    pub fn pick(&mut self, index: usize) -> Option<CommandOutcome> {
        let entry = QUICK_COMMANDS.get(index)?;
        info!(label = entry.label, "command picked");
        let outcome = self.process_command(entry.phrase);
        self.status.picker_open = false;
        self.publish();
        Some(outcome)
    }

    /// Open the help overlay from the keyboard
    pub fn show_help(&mut self) {
        self.status.help_open = true;
        self.say(HELP_KEY);
        self.publish();
    }

    /// Close the topmost overlay: picker first, then help
    pub fn close_overlay(&mut self) -> bool {
        if self.status.picker_open {
            self.status.picker_open = false;
        } else if self.status.help_open {
            self.status.help_open = false;
        } else {
            return false;
        }
        self.publish();
        true
    }

    /// Apply a global shortcut; returns false when the key is left for others
    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> bool {
        match shortcut {
            Shortcut::StartVoiceCommand => {
                self.start_voice_command();
                true
            }
            Shortcut::ShowHelp => {
                self.show_help();
                true
            }
            Shortcut::Navigate(route) => {
                info!(%route, "direct navigation shortcut");
                self.say(&format!("Going to {}", destination(route)));
                self.scheduler.now(Deferred::Navigate(route));
                true
            }
            Shortcut::CloseOverlay => self.close_overlay(),
            Shortcut::Digit(digit) if self.status.picker_open && digit >= 1 => {
                self.pick(usize::from(digit) - 1).is_some()
            }
            Shortcut::Digit(_) | Shortcut::Quit => false,
        }
    }
}

/// Spoken name of a shortcut destination
fn destination(route: Route) -> &'static str {
    match route {
        Route::Home => "home page",
        Route::DocumentUpload => "document upload",
        Route::Braille => "braille evaluation",
        Route::Quiz => "quiz system",
        Route::History => "history lessons",
        Route::Help => "help",
    }
}
