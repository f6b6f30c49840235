//! Application loop
//!
//! One task owns the navigator, the command dispatcher and the module
//! sessions (document Q&A, quiz, lesson player). Key presses, recognition
//! events and deferred actions all arrive here as messages and are applied
//! in order.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::commands::{CommandTable, Dispatcher, DispatcherStatus};
use crate::config::Timings;
use crate::events::NavigationEvent;
use crate::history::{LessonPlayer, PlayerStatus, SAMPLE_LESSON};
use crate::hotkey::{global_shortcut, HotkeyEvent, KeyPress, Shortcut};
use crate::lifecycle::ShutdownSignal;
use crate::qa::{DocumentQa, QaStatus};
use crate::quiz::{QuizStatus, VoiceQuiz, SAMPLE_QUIZ};
use crate::recognition::{RecognitionEvent, Recognizer, TypedRecognizer};
use crate::scheduler::{self, Deferred};
use crate::speech::Speech;
use crate::state::{Module, Navigator};

/// Whether the loop keeps running after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The running application
pub struct App {
    speech: Speech,
    navigator: Navigator,
    dispatcher: Dispatcher,
    qa: DocumentQa,
    quiz: VoiceQuiz,
    history: LessonPlayer,
    typed: Option<TypedRecognizer>,
    /// Voice command session events
    command_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    /// Question dictation session events
    question_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    /// Quiz answer dictation session events
    answer_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    deferred_rx: mpsc::UnboundedReceiver<Deferred>,
}

impl App {
    /// Wire up the application.
    ///
    /// `typed` is the recognizer behind voice input; without one, voice
    /// commands fall back to the manual picker and questions are simulated.
    pub fn new(
        speech: Speech,
        typed: Option<TypedRecognizer>,
        table: CommandTable,
        timings: Timings,
        navigation_tx: broadcast::Sender<NavigationEvent>,
    ) -> Self {
        let (scheduler, deferred_rx) = scheduler::channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (question_tx, question_rx) = mpsc::unbounded_channel();
        let (answer_tx, answer_rx) = mpsc::unbounded_channel();

        let recognizer = typed
            .clone()
            .map(|typed| Arc::new(typed) as Arc<dyn Recognizer>);

        let navigator = Navigator::new(
            speech.clone(),
            scheduler.clone(),
            timings.announce_delay,
            navigation_tx,
        );
        let dispatcher = Dispatcher::new(
            table,
            speech.clone(),
            recognizer.clone(),
            command_tx,
            scheduler.clone(),
            timings,
        );
        let qa = DocumentQa::new(
            speech.clone(),
            recognizer.clone(),
            question_tx,
            scheduler.clone(),
            timings,
        );
        let quiz = VoiceQuiz::new(
            speech.clone(),
            recognizer,
            answer_tx,
            scheduler.clone(),
            timings,
            &SAMPLE_QUIZ,
        );
        let history = LessonPlayer::new(speech.clone(), scheduler, timings, &SAMPLE_LESSON);

        Self {
            speech,
            navigator,
            dispatcher,
            qa,
            quiz,
            history,
            typed,
            command_rx,
            question_rx,
            answer_rx,
            deferred_rx,
        }
    }

    pub fn dispatcher_status(&self) -> watch::Receiver<DispatcherStatus> {
        self.dispatcher.subscribe()
    }

    pub fn qa_status(&self) -> watch::Receiver<QaStatus> {
        self.qa.subscribe()
    }

    pub fn quiz_status(&self) -> watch::Receiver<QuizStatus> {
        self.quiz.subscribe()
    }

    pub fn player_status(&self) -> watch::Receiver<PlayerStatus> {
        self.history.subscribe()
    }

    /// Run until Ctrl+C or a shutdown signal
    pub async fn run(
        mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        info!(module = %self.navigator.module(), "application started");
        self.navigator.announce_current();

        let signal = shutdown.wait();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                event = hotkey_rx.recv() => match event {
                    Some(HotkeyEvent::Key(press)) => {
                        if self.handle_key(press) == Flow::Quit {
                            info!("quit requested");
                            break;
                        }
                    }
                    Some(HotkeyEvent::InputLost) => {
                        error!("keyboard input lost, voice input disabled");
                        if let Some(typed) = &self.typed {
                            typed.input_lost();
                        }
                    }
                    None => {
                        warn!("keyboard listener gone, waiting for a shutdown signal");
                        let result = (&mut signal).await;
                        result.context("failed to wait for shutdown signal")?;
                        break;
                    }
                },
                Some(event) = self.command_rx.recv() => {
                    self.dispatcher.handle_recognition(event);
                }
                Some(event) = self.question_rx.recv() => {
                    self.qa.handle_recognition(event);
                }
                Some(event) = self.answer_rx.recv() => {
                    self.quiz.handle_recognition(event);
                }
                Some(action) = self.deferred_rx.recv() => {
                    self.handle_deferred(action);
                }
                result = &mut signal => {
                    result.context("failed to wait for shutdown signal")?;
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.speech.stop();
        Ok(())
    }

    /// Route a key press: global shortcuts first, then voice input, then
    /// the keys of the current module.
    ///
    /// While voice input is active the shortcut table leaves text keys
    /// alone, so only F1, Alt combinations and Ctrl+C get past the typing.
    pub fn handle_key(&mut self, press: KeyPress) -> Flow {
        let text_focus = self.typed.as_ref().is_some_and(|typed| typed.is_active());
        if let Some(shortcut) = global_shortcut(&press, text_focus) {
            if shortcut == Shortcut::Quit {
                return Flow::Quit;
            }
            if self.dispatcher.handle_shortcut(shortcut) {
                return Flow::Continue;
            }
        }

        if let Some(typed) = &self.typed {
            if typed.feed(&press) {
                return Flow::Continue;
            }
        }

        let handled = match self.navigator.module() {
            Module::Document => self.qa.handle_key(&press),
            Module::Quiz => self.quiz.handle_key(&press),
            Module::History => self.history.handle_key(&press),
            Module::Home | Module::Braille => false,
        };
        if !handled {
            debug!(?press, "unhandled key");
        }

        Flow::Continue
    }

    /// Switch modules, closing the old module's session and opening the new one's
    fn enter_module(&mut self, module: Module) {
        let previous = self.navigator.module();
        if !self.navigator.navigate(module) {
            return;
        }

        match previous {
            Module::Document => self.qa.leave(),
            Module::Quiz => self.quiz.leave(),
            Module::History => self.history.leave(),
            Module::Home | Module::Braille => {}
        }

        match module {
            Module::Quiz => {
                let intro = self.quiz.enter();
                self.navigator.announce(Deferred::Announce(intro));
            }
            Module::History => {
                self.history.enter();
                self.navigator.announce(Deferred::LessonIntro);
            }
            Module::Home | Module::Document | Module::Braille => {}
        }
    }

    /// Apply an action delivered by a timer or a shortcut
    pub fn handle_deferred(&mut self, action: Deferred) {
        match action {
            Deferred::Navigate(route) => {
                let Some(module) = Module::for_route(route) else {
                    debug!(%route, "route does not navigate");
                    return;
                };
                self.enter_module(module);
            }
            Deferred::OpenPicker => self.dispatcher.open_picker(),
            Deferred::Announce(text) => self.speech.speak(&text, None),
            Deferred::AnswerReady { question } => {
                if self.navigator.module() == Module::Document {
                    self.qa.answer_ready(&question);
                }
            }
            Deferred::LessonIntro => {
                if self.navigator.module() == Module::History {
                    self.history.intro();
                }
            }
            Deferred::PlayTopic { cue } => {
                if self.navigator.module() == Module::History {
                    self.history.play_cued(cue);
                }
            }
            Deferred::QuizEvaluated { cue } => {
                if self.navigator.module() == Module::Quiz {
                    self.quiz.evaluated(cue);
                }
            }
            Deferred::QuizHint { cue } => {
                if self.navigator.module() == Module::Quiz {
                    self.quiz.hint(cue);
                }
            }
        }
    }
}
