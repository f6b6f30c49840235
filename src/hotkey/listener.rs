//! Terminal keyboard listener
//!
//! Puts the terminal in raw mode and reads key events on a dedicated thread,
//! forwarding each press to the application loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::keys::KeyPress;

/// How long each read waits before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events sent from the keyboard listener to the application loop
#[derive(Debug, Clone)]
pub enum HotkeyEvent {
    /// A key was pressed
    Key(KeyPress),
    /// Reading the terminal failed; no more keys will arrive
    InputLost,
}

/// Keyboard listener that reads key presses from the terminal
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new keyboard listener
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the listener
    ///
    /// Enables raw mode and spawns a dedicated thread that reads key events
    /// until `stop()` is called.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        if let Err(e) = terminal::enable_raw_mode() {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::RawMode(e.to_string()));
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("keyboard listener thread started");

                if let Err(e) = run_event_loop(&event_tx, &running) {
                    error!(?e, "keyboard listener error");
                    let _ = event_tx.blocking_send(HotkeyEvent::InputLost);
                }

                running.store(false, Ordering::SeqCst);
                info!("keyboard listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                let _ = terminal::disable_raw_mode();
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop the listener and restore the terminal
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(?e, "failed to restore terminal mode");
        }
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the keyboard listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("keyboard listener is already running")]
    AlreadyRunning,

    #[error("failed to enable raw terminal mode: {0}")]
    RawMode(String),

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to read terminal input: {0}")]
    Read(#[from] std::io::Error),
}

/// Read terminal events until stopped
fn run_event_loop(
    event_tx: &mpsc::Sender<HotkeyEvent>,
    running: &AtomicBool,
) -> Result<(), HotkeyError> {
    while running.load(Ordering::SeqCst) {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }

        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        let press = KeyPress::from_event(&key_event);
        debug!(?press, "key pressed");

        if event_tx.blocking_send(HotkeyEvent::Key(press)).is_err() {
            warn!("failed to send key event - channel closed?");
            break;
        }
    }

    Ok(())
}
