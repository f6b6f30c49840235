//! Keyboard stand-in for a microphone
//!
//! While a session is active every key press is captured as "speech":
//! characters build the current line, Enter finalizes it, Escape ends the
//! session. Silence longer than the configured timeout ends it as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{
    ErrorCode, Fragment, RecognitionError, RecognitionEvent, RecognitionOptions, Recognizer,
};
use crate::hotkey::{Key, KeyPress};

/// Recognizer fed by typed key presses
#[derive(Clone)]
pub struct TypedRecognizer {
    shared: Arc<Shared>,
}

struct Shared {
    capture: Mutex<Option<Capture>>,
    silence_timeout: Duration,
    /// Line being typed, `None` while no session is active
    draft_tx: watch::Sender<Option<String>>,
    next_session: Mutex<u64>,
    /// Set once the keyboard is gone; no further sessions can start
    input_lost: AtomicBool,
}

struct Capture {
    session: u64,
    options: RecognitionOptions,
    line: String,
    /// Whether anything was finalized in this session
    heard: bool,
    events: mpsc::UnboundedSender<RecognitionEvent>,
    watchdog: Option<JoinHandle<()>>,
}

impl Capture {
    fn send(&self, event: RecognitionEvent) {
        let _ = self.events.send(event);
    }

    /// Deliver the pending line as a final result
    fn flush(&mut self) {
        let line = self.line.trim().to_string();
        self.line.clear();
        if !line.is_empty() {
            self.heard = true;
            self.send(RecognitionEvent::Result(vec![Fragment::final_(line)]));
        }
    }

    fn close(mut self, error: Option<ErrorCode>) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        if let Some(code) = error {
            self.send(RecognitionEvent::Error(code));
        }
        self.send(RecognitionEvent::Ended);
    }
}

impl TypedRecognizer {
    /// Create an idle recognizer; sessions end after `silence_timeout`
    /// without key presses
    pub fn new(silence_timeout: Duration) -> Self {
        let (draft_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                capture: Mutex::new(None),
                silence_timeout,
                draft_tx,
                next_session: Mutex::new(0),
                input_lost: AtomicBool::new(false),
            }),
        }
    }

    /// Observe the line being typed
    pub fn draft(&self) -> watch::Receiver<Option<String>> {
        self.shared.draft_tx.subscribe()
    }

    /// The keyboard stopped delivering keys: abort the active session and
    /// refuse new ones
    pub fn input_lost(&self) {
        self.shared.input_lost.store(true, Ordering::SeqCst);
        self.abort();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Capture>> {
        self.shared.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, draft: Option<String>) {
        self.shared.draft_tx.send_replace(draft);
    }

    /// Arm the silence timer for `session`
    fn watchdog(&self, session: u64) -> JoinHandle<()> {
        let recognizer = self.clone();
        let timeout = self.shared.silence_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            recognizer.expire(session);
        })
    }

    fn expire(&self, session: u64) {
        let mut guard = self.lock();
        if guard.as_ref().map(|capture| capture.session) != Some(session) {
            return;
        }
        let Some(mut capture) = guard.take() else {
            return;
        };
        drop(guard);

        debug!(session, "silence timeout");
        capture.watchdog = None;
        capture.flush();
        let error = (!capture.heard).then_some(ErrorCode::NoSpeech);
        capture.close(error);
        self.publish(None);
    }

    /// Offer a key press to the active session.
    ///
    /// Returns true when the key was consumed as input. Only plain
    /// characters, Backspace, Enter and Escape are input; function keys and
    /// anything held with Ctrl or Alt pass through to the shortcuts.
    pub fn feed(&self, press: &KeyPress) -> bool {
        if press.is_interrupt() {
            return false;
        }

        let mut guard = self.lock();
        let Some(capture) = guard.as_mut() else {
            return false;
        };

        let mut close: Option<Option<ErrorCode>> = None;
        match press.key {
            Key::Char(c) if press.modifiers.is_empty() => {
                capture.line.push(c);
                if capture.options.interim_results {
                    capture.send(RecognitionEvent::Result(vec![Fragment::interim(
                        capture.line.clone(),
                    )]));
                }
            }
            Key::Backspace => {
                capture.line.pop();
            }
            Key::Enter => {
                let empty = capture.line.trim().is_empty();
                capture.flush();
                if !capture.options.continuous {
                    close = Some(empty.then_some(ErrorCode::NoSpeech));
                }
            }
            Key::Esc => {
                if capture.options.continuous {
                    capture.flush();
                    close = Some(None);
                } else {
                    close = Some(Some(ErrorCode::Aborted));
                }
            }
            _ => return false,
        }

        match close {
            Some(error) => {
                if let Some(capture) = guard.take() {
                    drop(guard);
                    capture.close(error);
                }
                self.publish(None);
            }
            None => {
                if let Some(watchdog) = capture.watchdog.take() {
                    watchdog.abort();
                }
                capture.watchdog = Some(self.watchdog(capture.session));
                let line = capture.line.clone();
                drop(guard);
                self.publish(Some(line));
            }
        }

        true
    }
}

impl Recognizer for TypedRecognizer {
    fn start(
        &self,
        options: RecognitionOptions,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), RecognitionError> {
        if self.shared.input_lost.load(Ordering::SeqCst) {
            return Err(RecognitionError::Unavailable(
                "keyboard input is gone".to_string(),
            ));
        }

        let mut guard = self.lock();
        if guard.is_some() {
            return Err(RecognitionError::Busy);
        }

        let session = {
            let mut next = self
                .shared
                .next_session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };

        info!(
            session,
            continuous = options.continuous,
            lang = %options.lang,
            max_alternatives = options.max_alternatives,
            "listening for typed speech"
        );

        let capture = Capture {
            session,
            options,
            line: String::new(),
            heard: false,
            events,
            watchdog: Some(self.watchdog(session)),
        };
        capture.send(RecognitionEvent::Started);
        *guard = Some(capture);
        drop(guard);

        self.publish(Some(String::new()));
        Ok(())
    }

    fn stop(&self) {
        let Some(mut capture) = self.lock().take() else {
            return;
        };
        capture.flush();
        capture.close(None);
        self.publish(None);
    }

    fn abort(&self) {
        let Some(capture) = self.lock().take() else {
            return;
        };
        capture.close(Some(ErrorCode::Aborted));
        self.publish(None);
    }

    fn is_active(&self) -> bool {
        self.lock().is_some()
    }
}
