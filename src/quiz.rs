//! Voice quiz
//!
//! Each question is read aloud and answered by voice. Space or Enter records
//! an answer, and submits it once one is recorded. Q repeats the question,
//! R records again and S skips. After a short evaluation the score and an
//! explanation are spoken; F replays them and N moves on.

use std::sync::Arc;

use rand::Rng;
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
use crate::state::Module;

const QUESTION_KEYS: &str = "Press Space or Enter to record your answer, Press Q to repeat question, Press R to record, Press S to skip question.";
const LISTENING: &str = "Listening for your answer. Press Escape when you are done.";
const NOTHING_HEARD: &str = "No answer recorded. Press Space to try again.";
const EVALUATING: &str = "Evaluating your answer.";
const FEEDBACK_KEYS: &str = "Press F to replay feedback. Press Space, Enter, or N for next question.";

#[derive(Debug)]
pub struct Question {
    pub text: &'static str,
    pub expected_answer: &'static str,
    /// Spoken after the score
    pub explanation: &'static str,
}

#[derive(Debug)]
pub struct Quiz {
    pub topic: &'static str,
    pub questions: &'static [Question],
}

/// Quiz loaded when the module opens
pub static SAMPLE_QUIZ: Quiz = Quiz {
    topic: "Introduction to Education",
    questions: &[
        Question {
            text: "What is the primary purpose of education in society?",
            expected_answer: "The primary purpose of education is to develop individuals intellectually, socially, and emotionally, preparing them to contribute meaningfully to society. Education transmits knowledge, skills, values, and cultural heritage.",
            explanation: "Education serves multiple purposes including knowledge transmission, skill development, socialization, and personal development. It prepares individuals for productive participation in society while promoting critical thinking and lifelong learning.",
        },
        Question {
            text: "How does education contribute to social development?",
            expected_answer: "Education contributes to social development by reducing poverty, promoting equality, fostering social cohesion, and developing human capital. It enables social mobility and creates informed citizens.",
            explanation: "Education is a key driver of social development. It breaks cycles of poverty, promotes social equity, and builds the human capital necessary for economic and social progress.",
        },
    ],
};

/// How well an answer scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Correct,
    Partial,
    Incorrect,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            85.. => Grade::Correct,
            60..=84 => Grade::Partial,
            _ => Grade::Incorrect,
        }
    }

    /// Opening words of the spoken feedback
    pub fn title(&self) -> &'static str {
        match self {
            Grade::Correct => "Excellent!",
            Grade::Partial => "Good Effort!",
            Grade::Incorrect => "Keep Learning!",
        }
    }
}

/// Where the quiz is in its question, evaluation, feedback cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for an answer
    #[default]
    Question,
    /// A submitted answer is being scored
    Evaluating,
    /// Score and explanation given
    Feedback,
    /// Every question was answered or skipped
    Complete,
}

/// Observable quiz state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuizStatus {
    pub stage: Stage,
    /// One-based number of the current question
    pub question: usize,
    pub questions: usize,
    /// An answer dictation session is running
    pub listening: bool,
    /// Recorded answer not yet submitted
    pub answer: Option<String>,
    /// Score of the last evaluated answer
    pub score: Option<u8>,
}

/// Answer "heard" when no recognizer is present: the opening sentence of
/// the expected answer
pub fn simulated_answer(question: &Question) -> String {
    let answer = question.expected_answer;
    match answer.find(". ") {
        Some(end) => answer[..=end].to_string(),
        None => answer.to_string(),
    }
}

/// Voice quiz of the quiz module
pub struct VoiceQuiz {
    speech: Speech,
    recognizer: Option<Arc<dyn Recognizer>>,
    recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
    scheduler: Scheduler,
    timings: Timings,
    quiz: &'static Quiz,
    /// Zero-based index of the current question
    current: usize,
    buffer: TranscriptBuffer,
    evaluating: Option<JoinHandle<()>>,
    /// Spoken feedback of the last evaluation, for replay
    feedback: Option<String>,
    scores: Vec<u8>,
    /// Bumped whenever the quiz moves on; stale evaluations and hints are
    /// dropped
    cue: u64,
    status: QuizStatus,
    status_tx: watch::Sender<QuizStatus>,
}

impl VoiceQuiz {
    pub fn new(
        speech: Speech,
        recognizer: Option<Arc<dyn Recognizer>>,
        recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
        scheduler: Scheduler,
        timings: Timings,
        quiz: &'static Quiz,
    ) -> Self {
        let status = QuizStatus {
            question: 1,
            questions: quiz.questions.len(),
            ..QuizStatus::default()
        };
        let (status_tx, _) = watch::channel(status.clone());
        Self {
            speech,
            recognizer,
            recognition_tx,
            scheduler,
            timings,
            quiz,
            current: 0,
            buffer: TranscriptBuffer::default(),
            evaluating: None,
            feedback: None,
            scores: Vec::new(),
            cue: 0,
            status,
            status_tx,
        }
    }

    pub fn status(&self) -> &QuizStatus {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<QuizStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&mut self) {
        self.status.question = self.current + 1;
        self.status.questions = self.quiz.questions.len();
        self.status_tx.send_replace(self.status.clone());
    }

    fn question(&self) -> Option<&'static Question> {
        self.quiz.questions.get(self.current)
    }

    fn say(&self, text: &str) {
        self.speech.speak(text, None);
    }

    /// Start from the first question; returns the entry announcement
    pub fn enter(&mut self) -> String {
        self.restart_state();
        self.publish();
        format!(
            "{}. {}. {}",
            Module::Quiz.title(),
            self.quiz.topic,
            self.prompt()
        )
    }

    fn restart_state(&mut self) {
        self.cue += 1;
        self.current = 0;
        self.scores.clear();
        self.feedback = None;
        self.buffer.reset();
        self.status = QuizStatus::default();
    }

    /// Full reading of the current question with the available keys
    fn prompt(&self) -> String {
        match self.question() {
            Some(question) => format!(
                "Question {} of {}. {} {}",
                self.current + 1,
                self.quiz.questions.len(),
                question.text,
                QUESTION_KEYS
            ),
            None => "This quiz has no questions.".to_string(),
        }
    }

    /// Handle a key press in the quiz module; returns true if consumed
    pub fn handle_key(&mut self, press: &KeyPress) -> bool {
        if !press.modifiers.is_empty() {
            return false;
        }
        let Key::Char(c) = press.key else {
            return press.key == Key::Enter && self.confirm();
        };
        match (self.status.stage, c.to_ascii_lowercase()) {
            (_, ' ') => self.confirm(),
            (Stage::Question, 'q') => {
                self.repeat();
                true
            }
            (Stage::Question, 'r') => {
                if !self.status.listening {
                    self.record();
                }
                true
            }
            (Stage::Question, 's') => {
                info!(question = self.current + 1, "question skipped");
                self.next();
                true
            }
            (Stage::Feedback, 'f') => self.replay_feedback(),
            (Stage::Feedback, 'n') => {
                self.next();
                true
            }
            _ => false,
        }
    }

    /// Space or Enter: the main action of the current stage
    fn confirm(&mut self) -> bool {
        match self.status.stage {
            Stage::Question => {
                if self.status.listening {
                    if let Some(recognizer) = &self.recognizer {
                        recognizer.stop();
                    }
                } else if self.status.answer.is_some() {
                    self.submit();
                } else {
                    self.record();
                }
            }
            Stage::Evaluating => debug!("answer already being evaluated"),
            Stage::Feedback => self.next(),
            Stage::Complete => {
                self.restart_state();
                self.publish();
                self.say(&self.prompt());
            }
        }
        true
    }

    fn repeat(&mut self) {
        if let Some(question) = self.question() {
            self.say(&format!("Question {}. {}", self.current + 1, question.text));
        }
    }

    /// Start recording an answer
    fn record(&mut self) {
        self.status.answer = None;
        self.buffer.reset();

        let Some(recognizer) = self.recognizer.clone() else {
            if let Some(question) = self.question() {
                let answer = simulated_answer(question);
                info!(answer = %answer, "simulated answer recorded");
                self.answer_recorded(answer);
            }
            return;
        };

        match recognizer.start(RecognitionOptions::dictation(), self.recognition_tx.clone()) {
            Ok(()) => self.status.listening = true,
            Err(e) => {
                warn!(error = %e, "failed to start answer recording");
                self.say(&ErrorCode::Other(e.to_string()).describe());
            }
        }
        self.publish();
    }

    fn answer_recorded(&mut self, answer: String) {
        self.say(&format!(
            "Your answer: {}. Press Space to submit, or R to record again.",
            answer
        ));
        self.status.answer = Some(answer);
        self.publish();
    }

    fn submit(&mut self) {
        let Some(answer) = self.status.answer.take() else {
            return;
        };
        info!(question = self.current + 1, answer = %answer, "answer submitted");
        self.cue += 1;
        self.status.stage = Stage::Evaluating;
        self.say(EVALUATING);
        self.evaluating = Some(self.scheduler.after(
            self.timings.answer_delay,
            Deferred::QuizEvaluated { cue: self.cue },
        ));
        self.publish();
    }

    /// The evaluation issued under `cue` finished
    pub fn evaluated(&mut self, cue: u64) {
        if cue != self.cue || self.status.stage != Stage::Evaluating {
            debug!(cue, "stale quiz evaluation");
            return;
        }
        self.evaluating = None;
        let Some(question) = self.question() else {
            return;
        };

        let score = rand::thread_rng().gen_range(70..100);
        let grade = Grade::from_score(score);
        info!(question = self.current + 1, score, ?grade, "answer evaluated");

        let text = format!(
            "{} You scored {} percent. {}",
            grade.title(),
            score,
            question.explanation
        );
        let scheduler = self.scheduler.clone();
        let gap = self.timings.hint_delay;
        self.speech.speak(
            &text,
            Some(Box::new(move || {
                scheduler.after(gap, Deferred::QuizHint { cue });
            })),
        );

        self.scores.push(score);
        self.feedback = Some(text);
        self.status.stage = Stage::Feedback;
        self.status.score = Some(score);
        self.publish();
    }

    /// Speak the feedback keys, unless the quiz moved on since `cue`
    pub fn hint(&mut self, cue: u64) {
        if cue == self.cue && self.status.stage == Stage::Feedback {
            self.say(FEEDBACK_KEYS);
        }
    }

    fn replay_feedback(&mut self) -> bool {
        let Some(feedback) = self.feedback.clone() else {
            return false;
        };
        self.cue += 1;
        let speech = self.speech.clone();
        let gap = self.timings.replay_gap;
        tokio::spawn(async move {
            speech::replay(&speech, &feedback, gap).await;
        });
        true
    }

    /// Cancel a running dictation; its remaining events are ignored
    fn stop_listening(&mut self) {
        if !self.status.listening {
            return;
        }
        self.status.listening = false;
        if let Some(recognizer) = &self.recognizer {
            recognizer.abort();
        }
    }

    /// Move to the next question, or finish the quiz after the last one
    fn next(&mut self) {
        self.stop_listening();
        self.cue += 1;
        self.buffer.reset();
        self.feedback = None;
        self.status.answer = None;
        self.status.score = None;

        if self.current + 1 < self.quiz.questions.len() {
            self.current += 1;
            self.status.stage = Stage::Question;
            self.publish();
            self.say(&self.prompt());
            return;
        }

        self.status.stage = Stage::Complete;
        self.publish();
        let answered = self.scores.len();
        let mut summary = format!(
            "Quiz complete. You answered {} of {} questions.",
            answered,
            self.quiz.questions.len()
        );
        if answered > 0 {
            let total: u32 = self.scores.iter().map(|&score| u32::from(score)).sum();
            summary.push_str(&format!(
                " Your average score was {} percent.",
                total / answered as u32
            ));
        }
        summary.push_str(" Press Space to start again.");
        info!(answered, "quiz complete");
        self.say(&summary);
    }

    /// Apply an answer dictation event; events of an abandoned session are
    /// dropped
    pub fn handle_recognition(&mut self, event: RecognitionEvent) {
        if !self.status.listening {
            debug!(?event, "answer recording not active, ignoring");
            return;
        }
        match event {
            RecognitionEvent::Started => self.say(LISTENING),
            RecognitionEvent::Result(fragments) => self.buffer.apply(&fragments),
            RecognitionEvent::Error(ErrorCode::Aborted) => debug!("answer recording aborted"),
            RecognitionEvent::Error(code) => {
                warn!(code = %code, "answer recording failed");
                self.buffer.reset();
                self.say(&code.describe());
            }
            RecognitionEvent::Ended => {
                self.status.listening = false;
                let answer = self.buffer.transcript().to_string();
                self.buffer.reset();
                if answer.is_empty() {
                    self.say(NOTHING_HEARD);
                } else {
                    self.answer_recorded(answer);
                }
            }
        }
        self.publish();
    }

    /// Drop in-flight work when the quiz module is left
    pub fn leave(&mut self) {
        if let Some(evaluating) = self.evaluating.take() {
            evaluating.abort();
        }
        self.stop_listening();
        self.restart_state();
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

    struct Harness {
        quiz: VoiceQuiz,
        speech: Arc<RecordingSpeech>,
        deferred: mpsc::UnboundedReceiver<Deferred>,
        recognition: mpsc::UnboundedReceiver<RecognitionEvent>,
    }

    fn harness(recognizer: Option<Arc<dyn Recognizer>>) -> Harness {
        let speech = RecordingSpeech::new();
        let (scheduler, deferred) = scheduler::channel();
        let (tx, recognition) = mpsc::unbounded_channel();
        let quiz = VoiceQuiz::new(
            speech.clone(),
            recognizer,
            tx,
            scheduler,
            Timings::default(),
            &SAMPLE_QUIZ,
        );
        Harness {
            quiz,
            speech,
            deferred,
            recognition,
        }
    }

    impl Harness {
        fn press(&mut self, c: char) -> bool {
            self.quiz.handle_key(&KeyPress::plain(Key::Char(c)))
        }

        fn pump(&mut self) {
            while let Ok(event) = self.recognition.try_recv() {
                self.quiz.handle_recognition(event);
            }
        }

        /// Submit the recorded answer and apply its evaluation
        async fn evaluate(&mut self) -> u64 {
            self.press(' ');
            let Some(Deferred::QuizEvaluated { cue }) = self.deferred.recv().await else {
                panic!("expected an evaluation");
            };
            self.quiz.evaluated(cue);
            cue
        }
    }

    #[test]
    fn test_grades() {
        assert_eq!(Grade::from_score(99), Grade::Correct);
        assert_eq!(Grade::from_score(85), Grade::Correct);
        assert_eq!(Grade::from_score(84), Grade::Partial);
        assert_eq!(Grade::from_score(60), Grade::Partial);
        assert_eq!(Grade::from_score(59), Grade::Incorrect);
        assert_eq!(Grade::Partial.title(), "Good Effort!");
    }

    #[test]
    fn test_simulated_answer_is_first_sentence() {
        assert_eq!(
            simulated_answer(&SAMPLE_QUIZ.questions[1]),
            "Education contributes to social development by reducing poverty, promoting equality, fostering social cohesion, and developing human capital."
        );
    }

    #[tokio::test]
    async fn test_enter_reads_first_question() {
        let mut h = harness(None);
        let intro = h.quiz.enter();
        assert_eq!(
            intro,
            format!(
                "Voice-Enabled Quiz System module. Introduction to Education. Question 1 of 2. What is the primary purpose of education in society? {}",
                QUESTION_KEYS
            )
        );
        assert_eq!(h.quiz.status().question, 1);
        assert_eq!(h.quiz.status().questions, 2);
    }

    #[tokio::test]
    async fn test_repeat_question() {
        let mut h = harness(None);
        assert!(h.press('q'));
        assert_eq!(
            h.speech.last().as_deref(),
            Some("Question 1. What is the primary purpose of education in society?")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_answer_flow() {
        let mut h = harness(None);

        assert!(h.press(' '));
        let answer = h.quiz.status().answer.clone().unwrap();
        assert_eq!(answer, simulated_answer(&SAMPLE_QUIZ.questions[0]));
        assert!(h.speech.last().unwrap().starts_with("Your answer: "));

        let start = tokio::time::Instant::now();
        let cue = h.evaluate().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(h.quiz.status().stage, Stage::Feedback);

        let score = h.quiz.status().score.unwrap();
        assert!((70..100).contains(&score));
        let feedback = h.speech.last().unwrap();
        assert!(feedback.starts_with(Grade::from_score(score).title()));
        assert!(feedback.contains(&format!("You scored {} percent.", score)));
        assert!(feedback.ends_with(SAMPLE_QUIZ.questions[0].explanation));

        h.speech.finish();
        let start = tokio::time::Instant::now();
        assert_eq!(h.deferred.recv().await, Some(Deferred::QuizHint { cue }));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        h.quiz.hint(cue);
        assert_eq!(h.speech.last().as_deref(), Some(FEEDBACK_KEYS));

        assert!(h.press('n'));
        assert_eq!(h.quiz.status().question, 2);
        assert_eq!(h.quiz.status().stage, Stage::Question);
        assert!(h.speech.last().unwrap().starts_with("Question 2 of 2."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_dropped_after_moving_on() {
        let mut h = harness(None);
        h.press(' ');
        let cue = h.evaluate().await;

        h.speech.finish();
        h.press('n');
        h.quiz.hint(cue);
        assert!(h.speech.last().unwrap().starts_with("Question 2 of 2."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_feedback() {
        let mut h = harness(None);
        assert!(!h.press('f'));

        h.press(' ');
        h.evaluate().await;
        let feedback = h.speech.last().unwrap();
        let spoken = h.speech.spoken().len();

        assert!(h.press('F'));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.speech.spoken().len(), spoken + 1);
        assert_eq!(h.speech.last(), Some(feedback));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_completion_and_restart() {
        let mut h = harness(None);

        assert!(h.press('s'));
        assert_eq!(h.quiz.status().question, 2);
        h.press(' ');
        h.evaluate().await;
        h.press('n');

        assert_eq!(h.quiz.status().stage, Stage::Complete);
        let summary = h.speech.last().unwrap();
        assert!(summary.starts_with("Quiz complete. You answered 1 of 2 questions. Your average score was"));
        assert!(summary.ends_with("Press Space to start again."));

        h.press(' ');
        assert_eq!(h.quiz.status().stage, Stage::Question);
        assert_eq!(h.quiz.status().question, 1);
        assert!(h.speech.last().unwrap().starts_with("Question 1 of 2."));
    }

    #[tokio::test]
    async fn test_keys_ignored_while_evaluating() {
        let mut h = harness(None);
        h.press(' ');
        h.press(' ');
        assert_eq!(h.quiz.status().stage, Stage::Evaluating);

        assert!(h.press(' '));
        assert!(!h.press('s'));
        assert!(!h.press('q'));
        assert_eq!(h.quiz.status().stage, Stage::Evaluating);
        assert_eq!(h.speech.last().as_deref(), Some(EVALUATING));
    }

    #[tokio::test]
    async fn test_dictated_answer_and_rerecord() {
        let recognizer = FakeRecognizer::new();
        let mut h = harness(Some(recognizer.clone()));

        h.quiz.handle_key(&KeyPress::plain(Key::Enter));
        assert!(h.quiz.status().listening);
        recognizer.emit(RecognitionEvent::Result(vec![Fragment::final_("to prepare people")]));
        recognizer.emit(RecognitionEvent::Ended);
        h.pump();
        assert_eq!(h.quiz.status().answer.as_deref(), Some("to prepare people"));

        assert!(h.press('r'));
        assert!(h.quiz.status().answer.is_none());
        assert_eq!(recognizer.starts(), 2);
        recognizer.emit(RecognitionEvent::Ended);
        h.pump();
        assert_eq!(h.speech.last().as_deref(), Some(NOTHING_HEARD));
    }

    #[tokio::test]
    async fn test_skip_while_recording_is_silent() {
        let recognizer = FakeRecognizer::new();
        let mut h = harness(Some(recognizer.clone()));

        h.press(' ');
        h.press('s');
        assert!(!recognizer.is_active());
        h.pump();

        assert!(h.speech.last().unwrap().starts_with("Question 2 of 2."));
        assert!(h.quiz.status().answer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_drops_evaluation() {
        let mut h = harness(None);
        h.press(' ');
        h.press(' ');

        h.quiz.leave();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.deferred.try_recv().is_err());
        assert_eq!(h.quiz.status().stage, Stage::Question);
        assert_eq!(h.quiz.status().question, 1);
    }
}
