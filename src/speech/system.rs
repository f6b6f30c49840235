//! System text-to-speech backend
//!
//! Runs an espeak-compatible program (`espeak-ng` by default) once per
//! utterance. Cancelling kills the child process.

use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::platform::{BackendEvent, SynthesisBackend, SynthesisError, UtteranceRequest, Voice};

/// espeak's default speed in words per minute
const BASE_WPM: f32 = 175.0;

/// espeak amplitude for volume 1.0
const BASE_AMPLITUDE: f32 = 100.0;

/// espeak pitch for pitch 1.0
const BASE_PITCH: f32 = 50.0;

/// Speech backend spawning a system TTS program
pub struct CommandBackend {
    program: String,
    voices: Vec<Voice>,
    active: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandBackend {
    /// Capability check: `None` when `program` cannot be run
    pub fn detect(program: &str) -> Option<Self> {
        let available = std::process::Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);

        if !available {
            warn!(program, "speech program not found");
            return None;
        }

        let voices = std::process::Command::new(program)
            .arg("--voices")
            .stderr(Stdio::null())
            .output()
            .map(|output| parse_voices(&String::from_utf8_lossy(&output.stdout)))
            .unwrap_or_default();

        info!(program, voices = voices.len(), "speech program found");

        Some(Self {
            program: program.to_string(),
            voices,
            active: Mutex::new(None),
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// Columns: `Pty Language Age/Gender VoiceName File Other Languages`.
fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_, lang, _, name, ..] => Some(Voice {
                    name: (*name).to_string(),
                    lang: (*lang).to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

impl SynthesisBackend for CommandBackend {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(
        &self,
        request: UtteranceRequest,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<(), SynthesisError> {
        let mut command = Command::new(&self.program);
        command
            .arg("-s")
            .arg(format!("{}", (BASE_WPM * request.rate).round() as u32))
            .arg("-a")
            .arg(format!("{}", (BASE_AMPLITUDE * request.volume).round() as u32))
            .arg("-p")
            .arg(format!("{}", (BASE_PITCH * request.pitch).round() as u32));
        let voice = request
            .voice
            .as_ref()
            .map_or(request.lang.as_str(), |voice| voice.lang.as_str());
        command
            .arg("-v")
            .arg(voice.to_lowercase())
            .arg("--")
            .arg(&request.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let (kill_tx, kill_rx) = oneshot::channel();
        *self.active() = Some(kill_tx);

        let id = request.id;
        let _ = events.send(BackendEvent::Started { id });

        tokio::spawn(async move {
            let event = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => BackendEvent::Ended { id },
                    Ok(status) => BackendEvent::Failed {
                        id,
                        code: format!("exit-{}", status.code().unwrap_or(-1)),
                    },
                    Err(e) => BackendEvent::Failed {
                        id,
                        code: format!("wait-failed: {}", e),
                    },
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        debug!(?e, "speech process already gone");
                    }
                    BackendEvent::Failed {
                        id,
                        code: "interrupted".to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });

        Ok(())
    }

    fn cancel(&self) {
        if let Some(kill) = self.active().take() {
            let _ = kill.send(());
        }
    }

    fn pause(&self) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unsupported("pause"))
    }

    fn resume(&self) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unsupported("resume"))
    }
}
