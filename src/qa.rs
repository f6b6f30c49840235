//! Spoken questions about an uploaded document
//!
//! Space records a question (or submits the one already recorded), A replays
//! the last answer. Answers are simulated after a fixed processing delay.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Timings;
use crate::hotkey::{Key, KeyPress};
use crate::recognition::{
    ErrorCode, RecognitionEvent, RecognitionOptions, Recognizer, TranscriptBuffer,
};
use crate::scheduler::{Deferred, Scheduler};
use crate::speech::{self, Speech};

/// Questions "heard" when no recognizer is present
const MOCK_QUESTIONS: [&str; 4] = [
    "What are the main benefits of accessible education?",
    "How do adaptive technologies help visually impaired students?",
    "What is multi-sensory learning and why is it important?",
    "Can you explain the role of inclusive teaching methods?",
];

const LISTENING: &str = "Listening for your question. Press Escape when you are done.";
const PROCESSING: &str = "Processing your question.";
const ANSWER_RECEIVED: &str =
    "Answer received. Press A to replay the answer anytime, or press Space to ask another question.";
const NOTHING_HEARD: &str = "No question recorded. Press Space to try again.";

/// Observable Q&A state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QaStatus {
    /// A dictation session is running
    pub listening: bool,
    /// A submitted question is waiting for its answer
    pub processing: bool,
    /// Recorded question not yet submitted
    pub question: Option<String>,
    /// An answer is available for replay
    pub has_answer: bool,
}

/// Question and answer session of the document module
pub struct DocumentQa {
    speech: Speech,
    recognizer: Option<Arc<dyn Recognizer>>,
    recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
    scheduler: Scheduler,
    timings: Timings,
    buffer: TranscriptBuffer,
    answer: Option<String>,
    processing: Option<JoinHandle<()>>,
    status: QaStatus,
    status_tx: watch::Sender<QaStatus>,
}

/// Simulated answer to `question`
pub fn mock_answer(question: &str) -> String {
    let opening = if question.to_lowercase().contains("what") {
        "the answer involves"
    } else {
        "this relates to"
    };
    format!(
        "Based on the document, {} the educational methodologies discussed. The document emphasizes accessible learning materials and adaptive technologies that support students with visual impairments through multi-sensory experiences and personalized teaching approaches.",
        opening
    )
}

impl DocumentQa {
    pub fn new(
        speech: Speech,
        recognizer: Option<Arc<dyn Recognizer>>,
        recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
        scheduler: Scheduler,
        timings: Timings,
    ) -> Self {
        let (status_tx, _) = watch::channel(QaStatus::default());
        Self {
            speech,
            recognizer,
            recognition_tx,
            scheduler,
            timings,
            buffer: TranscriptBuffer::default(),
            answer: None,
            processing: None,
            status: QaStatus::default(),
            status_tx,
        }
    }

    pub fn status(&self) -> &QaStatus {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<QaStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&mut self) {
        self.status.processing = self.processing.is_some();
        self.status.has_answer = self.answer.is_some();
        self.status_tx.send_replace(self.status.clone());
    }

    /// Handle a key press in the document module; returns true if consumed
    pub fn handle_key(&mut self, press: &KeyPress) -> bool {
        if !press.modifiers.is_empty() {
            return false;
        }
        match press.key {
            Key::Char(' ') => {
                self.space();
                true
            }
            Key::Char('r') | Key::Char('R') => {
                if self.processing.is_none() && !self.status.listening {
                    self.record();
                }
                true
            }
            Key::Char('a') | Key::Char('A') => self.replay_answer(),
            _ => false,
        }
    }

    fn space(&mut self) {
        if self.processing.is_some() {
            debug!("question already processing");
            return;
        }
        if !self.status.listening && self.status.question.is_some() {
            self.submit();
        } else if self.status.listening {
            if let Some(recognizer) = &self.recognizer {
                recognizer.stop();
            }
        } else {
            self.record();
        }
    }

    /// Start recording a question
    fn record(&mut self) {
        self.status.question = None;
        self.buffer.reset();

        let Some(recognizer) = self.recognizer.clone() else {
            let question = MOCK_QUESTIONS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(MOCK_QUESTIONS[0]);
            info!(question, "simulated question recorded");
            self.question_recorded(question.to_string());
            return;
        };

        match recognizer.start(RecognitionOptions::dictation(), self.recognition_tx.clone()) {
            Ok(()) => self.status.listening = true,
            Err(e) => {
                warn!(error = %e, "failed to start question recording");
                self.speech.speak(&ErrorCode::Other(e.to_string()).describe(), None);
            }
        }
        self.publish();
    }

    fn question_recorded(&mut self, question: String) {
        self.speech.speak(
            &format!("Your question: {}. Press Space to submit.", question),
            None,
        );
        self.status.question = Some(question);
        self.publish();
    }

    /// Send the recorded question for answering
    fn submit(&mut self) {
        let Some(question) = self.status.question.take() else {
            return;
        };
        info!(question = %question, "question submitted");
        self.answer = None;
        self.speech.speak(PROCESSING, None);
        self.processing = Some(
            self.scheduler
                .after(self.timings.answer_delay, Deferred::AnswerReady { question }),
        );
        self.publish();
    }

    /// The simulated processing of `question` finished
    pub fn answer_ready(&mut self, question: &str) {
        if self.processing.take().is_none() {
            debug!("answer arrived after leaving the module");
            return;
        }

        let answer = mock_answer(question);
        let scheduler = self.scheduler.clone();
        self.speech.speak(
            &answer,
            Some(Box::new(move || {
                scheduler.now(Deferred::Announce(ANSWER_RECEIVED.to_string()))
            })),
        );
        self.answer = Some(answer);
        self.publish();
    }

    /// Speak the last answer again
    pub fn replay_answer(&self) -> bool {
        let Some(answer) = self.answer.clone() else {
            return false;
        };
        let speech = self.speech.clone();
        let gap = self.timings.replay_gap;
        tokio::spawn(async move {
            speech::replay(&speech, &answer, gap).await;
        });
        true
    }

    /// Apply a dictation session event.
    ///
    /// Events of a session this module no longer owns (aborted by `leave`)
    /// are dropped.
    pub fn handle_recognition(&mut self, event: RecognitionEvent) {
        if !self.status.listening {
            debug!(?event, "question recording not active, ignoring");
            return;
        }
        match event {
            RecognitionEvent::Started => self.speech.speak(LISTENING, None),
            RecognitionEvent::Result(fragments) => self.buffer.apply(&fragments),
            RecognitionEvent::Error(ErrorCode::Aborted) => {
                debug!("question recording aborted");
            }
            RecognitionEvent::Error(code) => {
                warn!(code = %code, "question recording failed");
                self.buffer.reset();
                self.speech.speak(&code.describe(), None);
            }
            RecognitionEvent::Ended => {
                self.status.listening = false;
                let question = self.buffer.transcript().to_string();
                self.buffer.reset();
                if question.is_empty() {
                    self.speech.speak(NOTHING_HEARD, None);
                } else {
                    self.question_recorded(question);
                }
            }
        }
        self.publish();
    }

    /// Drop in-flight work when the document module is left
    pub fn leave(&mut self) {
        if let Some(processing) = self.processing.take() {
            processing.abort();
        }
        if self.status.listening {
            if let Some(recognizer) = &self.recognizer {
                recognizer.abort();
            }
        }
        self.status = QaStatus::default();
        self.buffer.reset();
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::recognition::testing::FakeRecognizer;
    use crate::recognition::Fragment;
    use crate::scheduler;
    use crate::speech::testing::RecordingSpeech;

    fn create_qa(
        recognizer: Option<Arc<dyn Recognizer>>,
    ) -> (
        DocumentQa,
        Arc<RecordingSpeech>,
        mpsc::UnboundedReceiver<Deferred>,
        mpsc::UnboundedReceiver<RecognitionEvent>,
    ) {
        let speech = RecordingSpeech::new();
        let (scheduler, deferred) = scheduler::channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let qa = DocumentQa::new(speech.clone(), recognizer, tx, scheduler, Timings::default());
        (qa, speech, deferred, rx)
    }

    fn space() -> KeyPress {
        KeyPress::plain(Key::Char(' '))
    }

    #[test]
    fn test_mock_answer_wording() {
        assert!(mock_answer("What is braille?").starts_with("Based on the document, the answer involves"));
        assert!(mock_answer("How do screen readers work?")
            .starts_with("Based on the document, this relates to"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_question_flow() {
        let (mut qa, speech, mut deferred, _) = create_qa(None);

        assert!(qa.handle_key(&space()));
        let question = qa.status().question.clone().unwrap();
        assert!(MOCK_QUESTIONS.contains(&question.as_str()));

        assert!(qa.handle_key(&space()));
        assert!(qa.status().processing);
        assert_eq!(speech.last().as_deref(), Some(PROCESSING));

        let start = tokio::time::Instant::now();
        let ready = deferred.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(
            ready,
            Deferred::AnswerReady {
                question: question.clone()
            }
        );

        qa.answer_ready(&question);
        assert!(qa.status().has_answer);
        assert_eq!(speech.last(), Some(mock_answer(&question)));

        speech.finish();
        assert_eq!(
            deferred.recv().await,
            Some(Deferred::Announce(ANSWER_RECEIVED.to_string()))
        );
    }

    #[tokio::test]
    async fn test_space_ignored_while_processing() {
        let (mut qa, _, _, _) = create_qa(None);
        qa.handle_key(&space());
        qa.handle_key(&space());

        qa.handle_key(&space());
        assert!(qa.status().processing);
        assert!(qa.status().question.is_none());
    }

    #[tokio::test]
    async fn test_dictated_question() {
        let recognizer = FakeRecognizer::new();
        let (mut qa, _, _, mut events) = create_qa(Some(recognizer.clone()));

        qa.handle_key(&space());
        recognizer.emit(RecognitionEvent::Result(vec![Fragment::interim("what is")]));
        recognizer.emit(RecognitionEvent::Result(vec![Fragment::final_("what is braille")]));
        recognizer.emit(RecognitionEvent::Ended);
        while let Ok(event) = events.try_recv() {
            qa.handle_recognition(event);
        }

        assert!(!qa.status().listening);
        assert_eq!(qa.status().question.as_deref(), Some("what is braille"));
    }

    #[tokio::test]
    async fn test_recording_error_is_announced() {
        let recognizer = FakeRecognizer::new();
        let (mut qa, speech, _, _) = create_qa(Some(recognizer));

        qa.handle_key(&space());
        qa.handle_recognition(RecognitionEvent::Started);
        assert_eq!(speech.last().as_deref(), Some(LISTENING));
        qa.handle_recognition(RecognitionEvent::Error(ErrorCode::AudioCapture));
        assert_eq!(speech.last(), Some(ErrorCode::AudioCapture.describe()));

        qa.handle_recognition(RecognitionEvent::Ended);
        assert_eq!(speech.last().as_deref(), Some(NOTHING_HEARD));
        assert!(qa.status().question.is_none());
    }

    #[tokio::test]
    async fn test_aborted_session_is_silent_after_leave() {
        let recognizer = FakeRecognizer::new();
        let (mut qa, speech, _, mut events) = create_qa(Some(recognizer.clone()));

        qa.handle_key(&space());
        assert!(qa.status().listening);
        qa.leave();
        assert!(!recognizer.is_active());

        while let Ok(event) = events.try_recv() {
            qa.handle_recognition(event);
        }
        assert!(speech.spoken().is_empty());
        assert_eq!(qa.status(), &QaStatus::default());
    }

    #[tokio::test]
    async fn test_record_key_rerecords_unless_busy() {
        let recognizer = FakeRecognizer::new();
        let (mut qa, _, _, mut events) = create_qa(Some(recognizer.clone()));
        let record = KeyPress::plain(Key::Char('r'));

        qa.handle_key(&space());
        recognizer.emit(RecognitionEvent::Result(vec![Fragment::final_("what is braille")]));
        recognizer.emit(RecognitionEvent::Ended);
        while let Ok(event) = events.try_recv() {
            qa.handle_recognition(event);
        }
        assert_eq!(qa.status().question.as_deref(), Some("what is braille"));

        assert!(qa.handle_key(&record));
        assert!(qa.status().listening);
        assert!(qa.status().question.is_none());

        // Already recording
        assert!(qa.handle_key(&KeyPress::plain(Key::Char('R'))));
        assert!(qa.status().listening);
    }

    #[tokio::test]
    async fn test_record_key_ignored_while_processing() {
        let (mut qa, _, _, _) = create_qa(None);
        qa.handle_key(&space());
        qa.handle_key(&space());

        assert!(qa.handle_key(&KeyPress::plain(Key::Char('r'))));
        assert!(qa.status().processing);
        assert!(qa.status().question.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_requires_answer() {
        let (mut qa, speech, _, _) = create_qa(None);
        assert!(!qa.handle_key(&KeyPress::plain(Key::Char('a'))));

        qa.handle_key(&space());
        qa.handle_key(&space());
        qa.answer_ready("What is braille?");
        let spoken = speech.spoken().len();

        assert!(qa.handle_key(&KeyPress::plain(Key::Char('A'))));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(speech.spoken().len(), spoken + 1);
        assert_eq!(speech.last(), Some(mock_answer("What is braille?")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_discards_pending_answer() {
        let (mut qa, speech, mut deferred, _) = create_qa(None);
        qa.handle_key(&space());
        qa.handle_key(&space());

        qa.leave();
        qa.answer_ready("What is braille?");

        assert_eq!(speech.last().as_deref(), Some(PROCESSING));
        assert_eq!(qa.status(), &QaStatus::default());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(deferred.try_recv().is_err());
    }
}
