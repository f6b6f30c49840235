//! Terminal output
//!
//! Prints the speaking indicator, module transitions, the help and command
//! picker overlays and the progress of the module sessions. Logs go to
//! stderr; this owns stdout.

use std::io::{self, stdout, Write};

use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{self, ClearType};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::commands::{DispatcherStatus, QUICK_COMMANDS};
use crate::config::EventFormat;
use crate::events::{NavigationEvent, SpeechEvent};
use crate::history::PlayerStatus;
use crate::qa::QaStatus;
use crate::quiz::{QuizStatus, Stage};

const HELP_LINES: [&str; 10] = [
    "HELP",
    "  F1         speak a command",
    "  H          this help",
    "  Alt+0..4   home, document, braille, quiz, history",
    "  Esc        close overlay",
    "  Ctrl+C     quit",
    "  Document:  Space record/submit question, R record again, A replay answer",
    "  Quiz:      Space/Enter record/submit answer, Q repeat, R record again, S skip, F replay feedback, N next",
    "  History:   Space play/pause, Left/Right previous/next topic, 1-9 jump to topic, L list topics",
    "  Say: go to document upload, go to braille, take quiz, go to history, go home, help",
];

/// Status change printed in JSON mode
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StatusLine<'a> {
    Dispatcher {
        #[serde(flatten)]
        status: &'a DispatcherStatus,
    },
    Qa {
        #[serde(flatten)]
        status: &'a QaStatus,
    },
    Quiz {
        #[serde(flatten)]
        status: &'a QuizStatus,
    },
    Player {
        #[serde(flatten)]
        status: &'a PlayerStatus,
    },
}

/// Renders application state to the terminal
pub struct Display {
    format: EventFormat,
    dispatcher: DispatcherStatus,
    qa: QaStatus,
    quiz: QuizStatus,
    player: PlayerStatus,
}

impl Display {
    pub fn new(format: EventFormat) -> Self {
        Self {
            format,
            dispatcher: DispatcherStatus::default(),
            qa: QaStatus::default(),
            quiz: QuizStatus::default(),
            player: PlayerStatus::default(),
        }
    }

    /// Render events until every source closes
    pub async fn run(
        mut self,
        mut speech_rx: broadcast::Receiver<SpeechEvent>,
        mut navigation_rx: broadcast::Receiver<NavigationEvent>,
        mut dispatcher_rx: watch::Receiver<DispatcherStatus>,
        mut qa_rx: watch::Receiver<QaStatus>,
        mut quiz_rx: watch::Receiver<QuizStatus>,
        mut player_rx: watch::Receiver<PlayerStatus>,
        mut draft_rx: Option<watch::Receiver<Option<String>>>,
    ) {
        self.quiz = quiz_rx.borrow_and_update().clone();
        self.player = player_rx.borrow_and_update().clone();

        loop {
            let lines = tokio::select! {
                event = speech_rx.recv() => match event {
                    Ok(event) => self.speech_line(&event).into_iter().collect(),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "speech event receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = navigation_rx.recv() => match event {
                    Ok(event) => self.navigation_line(&event).into_iter().collect(),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "navigation event receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = dispatcher_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = dispatcher_rx.borrow_and_update().clone();
                    self.dispatcher_lines(status)
                }
                changed = qa_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = qa_rx.borrow_and_update().clone();
                    self.qa_lines(status)
                }
                changed = quiz_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = quiz_rx.borrow_and_update().clone();
                    self.quiz_lines(status)
                }
                changed = player_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = player_rx.borrow_and_update().clone();
                    self.player_lines(status)
                }
                Some(draft) = next_draft(&mut draft_rx) => {
                    if self.format == EventFormat::Text {
                        if let Err(e) = print_draft(draft.as_deref()) {
                            debug!(?e, "failed to draw draft");
                        }
                    }
                    continue;
                }
            };

            if let Err(e) = print_lines(&lines) {
                warn!(?e, "failed to write to terminal");
            }
        }

        debug!("display stopped");
    }

    fn speech_line(&self, event: &SpeechEvent) -> Option<String> {
        match self.format {
            EventFormat::Text => Some(event.to_string()),
            EventFormat::Json => to_json(event),
            EventFormat::Off => None,
        }
    }

    fn navigation_line(&self, event: &NavigationEvent) -> Option<String> {
        match self.format {
            EventFormat::Text => Some(event.to_string()),
            EventFormat::Json => to_json(event),
            EventFormat::Off => None,
        }
    }

    /// Lines for what changed since the last dispatcher status
    fn dispatcher_lines(&mut self, status: DispatcherStatus) -> Vec<String> {
        if status == self.dispatcher {
            return Vec::new();
        }
        if self.format == EventFormat::Json {
            let line = to_json(&StatusLine::Dispatcher { status: &status });
            self.dispatcher = status;
            return line.into_iter().collect();
        }

        let mut lines = Vec::new();
        if status.listening && !self.dispatcher.listening {
            lines.push("[listening for a command]".to_string());
        }
        if status.last_command != self.dispatcher.last_command {
            if let Some(command) = &status.last_command {
                lines.push(format!("heard: \"{}\"", command));
            }
        }
        if status.help_open && !self.dispatcher.help_open {
            lines.extend(HELP_LINES.iter().map(|line| line.to_string()));
        }
        if status.picker_open && !self.dispatcher.picker_open {
            lines.push("COMMANDS (press 1-6, Esc to close)".to_string());
            lines.extend(
                QUICK_COMMANDS
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| format!("  {}. {}", i + 1, entry.label)),
            );
        }
        if !status.picker_open && self.dispatcher.picker_open {
            lines.push("[command menu closed]".to_string());
        }
        if !status.help_open && self.dispatcher.help_open {
            lines.push("[help closed]".to_string());
        }

        self.dispatcher = status;
        lines
    }

    /// Lines for what changed since the last Q&A status
    fn qa_lines(&mut self, status: QaStatus) -> Vec<String> {
        if status == self.qa {
            return Vec::new();
        }
        if self.format == EventFormat::Json {
            let line = to_json(&StatusLine::Qa { status: &status });
            self.qa = status;
            return line.into_iter().collect();
        }

        let mut lines = Vec::new();
        if status.listening && !self.qa.listening {
            lines.push("[recording question]".to_string());
        }
        if status.question != self.qa.question {
            if let Some(question) = &status.question {
                lines.push(format!("question: {}", question));
            }
        }
        if status.processing && !self.qa.processing {
            lines.push("[processing question]".to_string());
        }
        if status.has_answer && !self.qa.has_answer {
            lines.push("[answer ready, press A to replay]".to_string());
        }

        self.qa = status;
        lines
    }

    /// Lines for what changed since the last quiz status
    fn quiz_lines(&mut self, status: QuizStatus) -> Vec<String> {
        if status == self.quiz {
            return Vec::new();
        }
        if self.format == EventFormat::Json {
            let line = to_json(&StatusLine::Quiz { status: &status });
            self.quiz = status;
            return line.into_iter().collect();
        }

        let mut lines = Vec::new();
        let moved = status.question != self.quiz.question || status.stage != self.quiz.stage;
        if moved && status.stage == Stage::Question {
            lines.push(format!("question {} of {}", status.question, status.questions));
        }
        if status.listening && !self.quiz.listening {
            lines.push("[recording answer]".to_string());
        }
        if status.answer != self.quiz.answer {
            if let Some(answer) = &status.answer {
                lines.push(format!("answer: {}", answer));
            }
        }
        if status.stage != self.quiz.stage {
            match status.stage {
                Stage::Evaluating => lines.push("[evaluating answer]".to_string()),
                Stage::Feedback => {
                    if let Some(score) = status.score {
                        lines.push(format!("score: {}% (F replay, N next)", score));
                    }
                }
                Stage::Complete => lines.push("[quiz complete, Space to start again]".to_string()),
                Stage::Question => {}
            }
        }

        self.quiz = status;
        lines
    }

    /// Lines for what changed since the last player status
    fn player_lines(&mut self, status: PlayerStatus) -> Vec<String> {
        if status == self.player {
            return Vec::new();
        }
        let lines = match self.format {
            EventFormat::Json => to_json(&StatusLine::Player { status: &status })
                .into_iter()
                .collect(),
            _ => vec![format!(
                "topic {} of {}: {}",
                status.topic, status.topics, status.title
            )],
        };
        self.player = status;
        lines
    }
}

/// Next change of the typed draft, if a recognizer publishes one
async fn next_draft(
    draft_rx: &mut Option<watch::Receiver<Option<String>>>,
) -> Option<Option<String>> {
    let rx = draft_rx.as_mut()?;
    if rx.changed().await.is_err() {
        *draft_rx = None;
        return None;
    }
    let draft = rx.borrow_and_update().clone();
    Some(draft)
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(?e, "failed to serialize event");
            None
        }
    }
}

fn print_lines(lines: &[String]) -> io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut out = stdout();
    for line in lines {
        queue!(out, Print(line), Print("\r\n"))?;
    }
    out.flush()
}

/// Redraw the line being typed in place
fn print_draft(draft: Option<&str>) -> io::Result<()> {
    let mut out = stdout();
    queue!(out, Print("\r"), terminal::Clear(ClearType::CurrentLine))?;
    if let Some(text) = draft {
        queue!(out, Print("> "), Print(text))?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Module;

    #[test]
    fn test_speech_line_formats() {
        let event = SpeechEvent::Started {
            text: "Navigating to take quiz".to_string(),
            duration_ms: Some(1600),
        };

        let text = Display::new(EventFormat::Text);
        assert_eq!(
            text.speech_line(&event).as_deref(),
            Some("SPEAKING (~2s): Navigating to take quiz")
        );

        let json = Display::new(EventFormat::Json);
        let line = json.speech_line(&event).unwrap();
        assert!(line.contains("\"type\":\"started\""));

        assert!(Display::new(EventFormat::Off).speech_line(&event).is_none());
    }

    #[test]
    fn test_navigation_line_json() {
        let display = Display::new(EventFormat::Json);
        let line = display
            .navigation_line(&NavigationEvent::ModuleEntered {
                module: Module::History,
            })
            .unwrap();
        assert_eq!(line, r#"{"type":"module_entered","module":"history"}"#);
    }

    #[test]
    fn test_picker_rendered_once() {
        let mut display = Display::new(EventFormat::Text);
        let status = DispatcherStatus {
            picker_open: true,
            ..DispatcherStatus::default()
        };

        let lines = display.dispatcher_lines(status.clone());
        assert_eq!(lines.len(), 1 + QUICK_COMMANDS.len());
        assert_eq!(lines[1], "  1. Go to Document Upload");
        assert!(display.dispatcher_lines(status).is_empty());

        let closed = display.dispatcher_lines(DispatcherStatus::default());
        assert_eq!(closed, vec!["[command menu closed]".to_string()]);
    }

    #[test]
    fn test_help_and_last_command() {
        let mut display = Display::new(EventFormat::Text);
        let lines = display.dispatcher_lines(DispatcherStatus {
            help_open: true,
            last_command: Some("help".to_string()),
            ..DispatcherStatus::default()
        });
        assert_eq!(lines[0], "heard: \"help\"");
        assert_eq!(lines[1], "HELP");
    }

    #[test]
    fn test_quiz_progress_lines() {
        let mut display = Display::new(EventFormat::Text);
        display.quiz = QuizStatus {
            question: 1,
            questions: 2,
            ..QuizStatus::default()
        };

        let lines = display.quiz_lines(QuizStatus {
            stage: Stage::Feedback,
            question: 1,
            questions: 2,
            score: Some(88),
            ..QuizStatus::default()
        });
        assert_eq!(lines, vec!["score: 88% (F replay, N next)".to_string()]);

        let lines = display.quiz_lines(QuizStatus {
            question: 2,
            questions: 2,
            ..QuizStatus::default()
        });
        assert_eq!(lines, vec!["question 2 of 2".to_string()]);
    }

    #[test]
    fn test_player_line() {
        let mut display = Display::new(EventFormat::Text);
        let status = PlayerStatus {
            lesson: "Prehistoric and Protohistoric Sri Lanka".to_string(),
            topic: 2,
            topics: 3,
            title: "Tools, Lifestyle, and Food Habits".to_string(),
        };
        assert_eq!(
            display.player_lines(status.clone()),
            vec!["topic 2 of 3: Tools, Lifestyle, and Food Habits".to_string()]
        );
        assert!(display.player_lines(status).is_empty());
    }

    #[test]
    fn test_status_json() {
        let mut display = Display::new(EventFormat::Json);
        let lines = display.qa_lines(QaStatus {
            processing: true,
            ..QaStatus::default()
        });
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(r#"{"type":"qa","listening":false,"processing":true"#));
    }
}
