//! Timer-driven speech engine that never produces audio
//!
//! Each utterance arms a completion timer sized by [`speaking_duration`].
//! The engine owns the single current utterance; `speak` and `stop` reset it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{preview, speaking_duration, OnEnd, SpeechEngine, SpeechState};
use crate::events::SpeechEvent;

/// What `pause` does to the completion timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Pause changes the reported state only; the timer keeps running
    #[default]
    Cosmetic,
    /// Pause halts the timer and resume re-arms it with the remaining time
    Suspend,
}

/// Simulated text-to-speech
#[derive(Clone)]
pub struct SimulatedSynthesis {
    inner: Arc<Mutex<Inner>>,
    event_tx: broadcast::Sender<SpeechEvent>,
    policy: PausePolicy,
}

struct Inner {
    state: SpeechState,
    current: Option<Utterance>,
    /// Id of the most recently issued utterance
    last_id: u64,
}

struct Utterance {
    id: u64,
    on_end: Option<OnEnd>,
    timer: Option<JoinHandle<()>>,
    /// When the timer is due to fire
    deadline: Instant,
    /// Time left when suspended by a pause
    remaining: Option<Duration>,
}

impl Utterance {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl SimulatedSynthesis {
    /// Create an idle engine
    pub fn new(policy: PausePolicy) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SpeechState::Idle,
                current: None,
                last_id: 0,
            })),
            event_tx,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SpeechEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Arm the completion timer for utterance `id`
    fn arm(&self, id: u64, delay: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.complete(id);
        })
    }

    /// Natural completion of utterance `id`
    fn complete(&self, id: u64) {
        let on_end = {
            let mut inner = self.lock();
            // A superseded timer may already be past its sleep
            match inner.current.as_ref() {
                Some(current) if current.id == id => {}
                _ => return,
            }
            let finished = inner.current.take();
            inner.state = SpeechState::Idle;
            finished.and_then(|mut utterance| utterance.on_end.take())
        };

        debug!(id, "utterance finished");
        self.emit(SpeechEvent::Finished);

        if let Some(on_end) = on_end {
            on_end();
        }
    }
}

impl SpeechEngine for SimulatedSynthesis {
    fn speak(&self, text: &str, on_end: Option<OnEnd>) {
        let duration = speaking_duration(text);
        let shown = preview(text);

        info!(
            duration_s = duration.as_secs_f64().round() as u64,
            text = %shown,
            "speaking"
        );

        {
            let mut inner = self.lock();
            if let Some(mut previous) = inner.current.take() {
                previous.cancel_timer();
                debug!(id = previous.id, "utterance superseded");
            }

            inner.last_id += 1;
            let id = inner.last_id;
            let timer = self.arm(id, duration);

            inner.current = Some(Utterance {
                id,
                on_end,
                timer: Some(timer),
                deadline: Instant::now() + duration,
                remaining: None,
            });
            inner.state = SpeechState::Speaking;
        }

        self.emit(SpeechEvent::Started {
            text: shown,
            duration_ms: Some(duration.as_millis() as u64),
        });
    }

    fn pause(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SpeechState::Speaking {
                return;
            }
            inner.state = SpeechState::Paused;

            if self.policy == PausePolicy::Suspend {
                if let Some(current) = inner.current.as_mut() {
                    current.cancel_timer();
                    current.remaining =
                        Some(current.deadline.saturating_duration_since(Instant::now()));
                }
            }
        }

        info!(policy = ?self.policy, "speech paused");
        self.emit(SpeechEvent::Paused);
    }

    fn resume(&self) {
        {
            let mut inner = self.lock();
            if inner.state != SpeechState::Paused {
                return;
            }
            inner.state = SpeechState::Speaking;

            let rearm = inner
                .current
                .as_mut()
                .and_then(|current| current.remaining.take().map(|left| (current.id, left)));
            if let Some((id, left)) = rearm {
                let timer = self.arm(id, left);
                if let Some(current) = inner.current.as_mut() {
                    current.timer = Some(timer);
                    current.deadline = Instant::now() + left;
                }
            }
        }

        info!("speech resumed");
        self.emit(SpeechEvent::Resumed);
    }

    fn stop(&self) {
        let had_current = {
            let mut inner = self.lock();
            inner.state = SpeechState::Idle;
            match inner.current.take() {
                Some(mut current) => {
                    current.cancel_timer();
                    true
                }
                None => false,
            }
        };

        info!("speech stopped");
        if had_current {
            self.emit(SpeechEvent::Stopped);
        }
    }

    fn state(&self) -> SpeechState {
        self.lock().state
    }

    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.event_tx.subscribe()
    }
}
