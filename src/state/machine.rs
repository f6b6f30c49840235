//! Module navigation
//!
//! Tracks which top-level module is current. Entering a module stops any
//! speech in flight and announces the module shortly after.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::commands::Route;
use crate::events::NavigationEvent;
use crate::scheduler::{Deferred, Scheduler};
use crate::speech::Speech;

/// Appended to every module announcement
const ANNOUNCEMENT_HINT: &str = "Press F1 for voice commands, or H for help.";

/// The top-level screens of the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    /// Main menu
    #[default]
    Home,
    /// Document upload and question answering
    Document,
    /// Braille answer sheet evaluation
    Braille,
    /// Voice quiz
    Quiz,
    /// Audio history lessons
    History,
}

impl Module {
    /// Module behind a command route; `None` for routes that do not navigate
    pub fn for_route(route: Route) -> Option<Self> {
        match route {
            Route::Home => Some(Module::Home),
            Route::DocumentUpload => Some(Module::Document),
            Route::Braille => Some(Module::Braille),
            Route::Quiz => Some(Module::Quiz),
            Route::History => Some(Module::History),
            Route::Help => None,
        }
    }

    /// Spoken title of the module
    pub fn title(&self) -> &'static str {
        match self {
            Module::Home => "Home page - Main menu",
            Module::Document => "Document Upload and Q&A module",
            Module::Braille => "Braille Answer Sheet Evaluation module",
            Module::Quiz => "Voice-Enabled Quiz System module",
            Module::History => "Audio History Learning module",
        }
    }

    /// What is spoken on entering the module
    pub fn announcement(&self) -> String {
        format!("{}. {}", self.title(), ANNOUNCEMENT_HINT)
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Module::Home => write!(f, "Home"),
            Module::Document => write!(f, "Document"),
            Module::Braille => write!(f, "Braille"),
            Module::Quiz => write!(f, "Quiz"),
            Module::History => write!(f, "History"),
        }
    }
}

/// Owns the current module and performs transitions
pub struct Navigator {
    /// Current module
    module: Module,
    /// Time when the current module was entered
    entered_at: Instant,
    speech: Speech,
    scheduler: Scheduler,
    announce_delay: Duration,
    /// Announcement timer of the latest transition
    pending_announcement: Option<JoinHandle<()>>,
    /// Channel for emitting navigation events
    event_tx: broadcast::Sender<NavigationEvent>,
}

impl Navigator {
    /// Create a navigator positioned at Home
    pub fn new(
        speech: Speech,
        scheduler: Scheduler,
        announce_delay: Duration,
        event_tx: broadcast::Sender<NavigationEvent>,
    ) -> Self {
        Self {
            module: Module::Home,
            entered_at: Instant::now(),
            speech,
            scheduler,
            announce_delay,
            pending_announcement: None,
            event_tx,
        }
    }

    /// Get the current module
    pub fn module(&self) -> Module {
        self.module
    }

    /// Schedule the announcement of the current module
    pub fn announce_current(&mut self) {
        self.announce(Deferred::Announce(self.module.announcement()));
    }

    /// Schedule `action` as the entry announcement, replacing a pending one
    pub fn announce(&mut self, action: Deferred) {
        if let Some(pending) = self.pending_announcement.take() {
            pending.abort();
        }
        self.pending_announcement = Some(self.scheduler.after(self.announce_delay, action));
    }

    /// Enter `module`; returns false when it is already current
    pub fn navigate(&mut self, module: Module) -> bool {
        if module == self.module {
            debug!(%module, "already in module");
            return false;
        }

        self.speech.stop();
        self.transition_to(module);
        self.announce_current();
        true
    }

    /// Perform a module transition
    fn transition_to(&mut self, new_module: Module) {
        let old_module = self.module;
        let duration_ms = self.entered_at.elapsed().as_millis() as u64;

        info!(
            from = %old_module,
            to = %new_module,
            duration_ms = duration_ms,
            "module transition"
        );

        self.emit(NavigationEvent::ModuleExited {
            module: old_module,
            duration_ms,
        });

        self.module = new_module;
        self.entered_at = Instant::now();

        self.emit(NavigationEvent::ModuleEntered { module: new_module });
    }

    fn emit(&self, event: NavigationEvent) {
        debug!(?event, "emitting navigation event");
        let _ = self.event_tx.send(event);
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_announcement.take() {
            pending.abort();
        }
    }
}
