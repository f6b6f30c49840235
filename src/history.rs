//! Audio history lessons
//!
//! A lesson is read aloud one topic at a time. Space plays, pauses and
//! resumes the current topic; Left and Right step between topics, digits
//! jump to one and L lists them all. Moving to a topic announces its title
//! and then plays it.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::Timings;
use crate::hotkey::{Key, KeyPress};
use crate::scheduler::{Deferred, Scheduler};
use crate::speech::{Speech, SpeechState};
use crate::state::Module;

/// A section of a lesson, spoken as one utterance
#[derive(Debug)]
pub struct Topic {
    pub title: &'static str,
    pub content: &'static str,
}

#[derive(Debug)]
pub struct Lesson {
    pub title: &'static str,
    pub topics: &'static [Topic],
}

/// Lesson loaded when the module opens
pub static SAMPLE_LESSON: Lesson = Lesson {
    title: "Prehistoric and Protohistoric Sri Lanka",
    topics: &[
        Topic {
            title: "Prehistoric Man (Balangoda Man)",
            content: "Balangoda Man represents the earliest known inhabitants of Sri Lanka, dating back to approximately 37,000 years ago. Named after the town of Balangoda where their remains were first discovered, these prehistoric people lived in caves and rock shelters, primarily in the wet zone of the island.",
        },
        Topic {
            title: "Tools, Lifestyle, and Food Habits",
            content: "The Balangoda Man used stone tools made from quartz and chert, including hand axes, scrapers and arrow points. They were semi-nomadic hunter-gatherers who relied on deer and wild boar, as well as fruits, roots and edible plants.",
        },
        Topic {
            title: "Archaeological Evidence (Belilena, Pahiyangala)",
            content: "The Belilena Cave in Kitulgala and Pahiyangala Cave near Bulathsinhala reveal the life of Balangoda Man. Belilena held skeletal remains, stone tools and evidence of fire use dating back 32,000 years, while Pahiyangala shows continuous occupation over thousands of years.",
        },
    ],
};

/// Observable player state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub lesson: String,
    /// One-based number of the current topic
    pub topic: usize,
    pub topics: usize,
    pub title: String,
}

/// Lesson player of the history module
pub struct LessonPlayer {
    speech: Speech,
    scheduler: Scheduler,
    timings: Timings,
    lesson: &'static Lesson,
    /// Zero-based index of the current topic
    current: usize,
    /// Bumped whenever the player speaks; queued playback runs only if
    /// its cue is still the latest
    cue: u64,
    status_tx: watch::Sender<PlayerStatus>,
}

impl LessonPlayer {
    pub fn new(speech: Speech, scheduler: Scheduler, timings: Timings, lesson: &'static Lesson) -> Self {
        let (status_tx, _) = watch::channel(PlayerStatus::default());
        let player = Self {
            speech,
            scheduler,
            timings,
            lesson,
            current: 0,
            cue: 0,
            status_tx,
        };
        player.publish();
        player
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    /// Zero-based index of the current topic
    pub fn current(&self) -> usize {
        self.current
    }

    fn topic(&self) -> Option<&'static Topic> {
        self.lesson.topics.get(self.current)
    }

    fn publish(&self) {
        let title = self.topic().map(|topic| topic.title).unwrap_or_default();
        self.status_tx.send_replace(PlayerStatus {
            lesson: self.lesson.title.to_string(),
            topic: self.current + 1,
            topics: self.lesson.topics.len(),
            title: title.to_string(),
        });
    }

    /// Start over from the first topic
    pub fn enter(&mut self) {
        self.current = 0;
        self.cue += 1;
        self.publish();
    }

    /// Drop queued playback when the module is left
    pub fn leave(&mut self) {
        self.cue += 1;
    }

    /// Speak the lesson introduction, then play the current topic
    pub fn intro(&mut self) {
        let Some(topic) = self.topic() else {
            debug!(lesson = self.lesson.title, "lesson has no topics");
            return;
        };
        let count = self.lesson.topics.len();
        let text = format!(
            "{}. {}. Topic {} of {}. {}. Press Space to play or pause. Press Right Arrow for next topic. Press Left Arrow for previous topic. Press number keys 1 to {} to jump to specific topics. Press L to list topics.",
            Module::History.title(),
            self.lesson.title,
            self.current + 1,
            count,
            topic.title,
            count
        );
        self.say_then_play(&text);
    }

    /// Handle a key press in the history module; returns true if consumed
    pub fn handle_key(&mut self, press: &KeyPress) -> bool {
        if !press.modifiers.is_empty() {
            return false;
        }
        match press.key {
            Key::Char(' ') => {
                self.toggle();
                true
            }
            Key::Right => {
                self.next();
                true
            }
            Key::Left => {
                self.previous();
                true
            }
            Key::Char('l') | Key::Char('L') => {
                self.list();
                true
            }
            Key::Char(c) => c
                .to_digit(10)
                .is_some_and(|number| self.jump(number as usize)),
            _ => false,
        }
    }

    /// Play, pause or resume depending on what the engine is doing
    fn toggle(&mut self) {
        match self.speech.state() {
            SpeechState::Speaking => self.speech.pause(),
            SpeechState::Paused => self.speech.resume(),
            SpeechState::Idle => self.play(),
        }
    }

    /// Queued playback after a topic announcement
    pub fn play_cued(&mut self, cue: u64) {
        if cue != self.cue {
            debug!(cue, latest = self.cue, "topic playback superseded");
            return;
        }
        self.play();
    }

    fn play(&mut self) {
        let Some(topic) = self.topic() else {
            return;
        };
        info!(topic = self.current + 1, title = topic.title, "playing topic");
        self.cue += 1;
        self.speech.speak(topic.content, None);
    }

    fn say(&mut self, text: &str) {
        self.cue += 1;
        self.speech.speak(text, None);
    }

    /// Speak `text`; once it finishes, play the current topic
    fn say_then_play(&mut self, text: &str) {
        self.cue += 1;
        let cue = self.cue;
        let scheduler = self.scheduler.clone();
        let gap = self.timings.topic_delay;
        self.speech.speak(
            text,
            Some(Box::new(move || {
                scheduler.after(gap, Deferred::PlayTopic { cue });
            })),
        );
    }

    fn select(&mut self, index: usize, announcement: &str) {
        self.current = index;
        self.publish();
        self.say_then_play(announcement);
    }

    fn next(&mut self) {
        let index = self.current + 1;
        match self.lesson.topics.get(index) {
            Some(topic) => self.select(index, &format!("Next topic. {}", topic.title)),
            None => self.say("Already at last topic"),
        }
    }

    fn previous(&mut self) {
        let previous = self
            .current
            .checked_sub(1)
            .and_then(|index| self.lesson.topics.get(index).map(|topic| (index, topic)));
        match previous {
            Some((index, topic)) => self.select(index, &format!("Previous topic. {}", topic.title)),
            None => self.say("Already at first topic"),
        }
    }

    /// Jump to topic `number` (one-based); false if there is no such topic
    fn jump(&mut self, number: usize) -> bool {
        let Some(index) = number.checked_sub(1) else {
            return false;
        };
        let Some(topic) = self.lesson.topics.get(index) else {
            return false;
        };
        self.select(index, &format!("Topic {}. {}", number, topic.title));
        true
    }

    fn list(&mut self) {
        let mut text = format!("{} topics in this lesson.", self.lesson.topics.len());
        for (i, topic) in self.lesson.topics.iter().enumerate() {
            text.push_str(&format!(" {}. {}.", i + 1, topic.title));
        }
        self.say(&text);
    }
}
