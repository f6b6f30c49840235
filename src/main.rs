//! voice-learn: voice-first learning assistant for the terminal
//!
//! Provides:
//! - Spoken output through a simulated or system speech engine
//! - Voice commands (F1) matched against a phrase table, with a manual
//!   command picker whenever voice input is unavailable
//! - Keyboard shortcuts for help and direct navigation between modules
//! - Spoken questions about an uploaded document
//! - A voice quiz with spoken scores and feedback
//! - Audio history lessons with play, pause and topic navigation
//!
//! Speech recognition is stood in for by typed input: while listening,
//! typed text is treated as what was heard.

mod app;
mod commands;
mod config;
mod display;
mod events;
mod history;
mod hotkey;
mod lifecycle;
mod qa;
mod quiz;
mod recognition;
mod scheduler;
mod speech;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::commands::CommandTable;
use crate::config::{Config, SynthesisKind};
use crate::display::Display;
use crate::events::NavigationEvent;
use crate::hotkey::HotkeyListener;
use crate::lifecycle::ShutdownSignal;
use crate::recognition::TypedRecognizer;
use crate::speech::{CommandBackend, PlatformSynthesis, SimulatedSynthesis, Speech};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout belongs to the display
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voice-learn starting");

    let config = Config::load().context("failed to load configuration")?;
    info!(
        synthesis = ?config.synthesis,
        recognition = config.recognition,
        events = ?config.events,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    let table = CommandTable::standard();
    check_table(&table);

    let speech = build_speech(&config);
    let typed = config
        .recognition
        .then(|| TypedRecognizer::new(config.silence_timeout));
    let draft_rx = typed.as_ref().map(TypedRecognizer::draft);

    // Keyboard listener -> application loop
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // Navigator -> display
    let (navigation_tx, _navigation_rx) = broadcast::channel::<NavigationEvent>(64);

    let app = App::new(
        Arc::clone(&speech),
        typed,
        table,
        config.timings,
        navigation_tx.clone(),
    );

    let display = Display::new(config.events);
    let display_task = tokio::spawn(display.run(
        speech.subscribe(),
        navigation_tx.subscribe(),
        app.dispatcher_status(),
        app.qa_status(),
        app.quiz_status(),
        app.player_status(),
        draft_rx,
    ));

    // Start the keyboard listener (runs on dedicated thread)
    let hotkey_listener = HotkeyListener::new(hotkey_tx);
    match hotkey_listener.start() {
        Ok(()) => {
            info!("keyboard listener started");
        }
        Err(e) => {
            error!(?e, "failed to start keyboard listener");
            warn!("continuing without keyboard input - is stdin a terminal?");
        }
    }

    info!("initialized, entering main loop");
    let result = app.run(hotkey_rx, &shutdown).await;

    // Cleanup
    info!("shutting down...");
    hotkey_listener.stop();
    display_task.abort();
    speech.stop();

    info!("voice-learn stopped");
    result
}

/// Build the configured speech engine
fn build_speech(config: &Config) -> Speech {
    match config.synthesis {
        SynthesisKind::Simulated => Arc::new(SimulatedSynthesis::new(config.pause_policy)),
        SynthesisKind::System => {
            let backend = CommandBackend::detect(&config.tts_program)
                .map(|backend| Arc::new(backend) as Arc<dyn speech::SynthesisBackend>);
            Arc::new(PlatformSynthesis::new(backend))
        }
    }
}

/// Report phrase table entries that can never match
fn check_table(table: &CommandTable) {
    for shadowed in table.shadowed() {
        if shadowed.changes_route() {
            warn!(
                phrase = %shadowed.phrase,
                route = %shadowed.route,
                by_phrase = %shadowed.by_phrase,
                by_route = %shadowed.by_route,
                "command phrase can never match"
            );
        } else {
            debug!(
                phrase = %shadowed.phrase,
                by_phrase = %shadowed.by_phrase,
                "command phrase is covered by an earlier phrase"
            );
        }
    }
    info!(phrases = table.len(), "command table loaded");
}
