//! Deferred actions delivered to the application loop
//!
//! Components never mutate each other from timers. A timer only sends a
//! [`Deferred`] message; the application loop applies it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::commands::Route;

/// An action to apply on the application loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Switch to the module behind `route`
    Navigate(Route),
    /// Show the manual command picker
    OpenPicker,
    /// Speak a message
    Announce(String),
    /// The simulated answer to a document question is ready
    AnswerReady { question: String },
    /// Speak the history lesson introduction
    LessonIntro,
    /// Play the current history topic, unless the player moved on since `cue`
    PlayTopic { cue: u64 },
    /// The submitted quiz answer has been scored
    QuizEvaluated { cue: u64 },
    /// Speak the keys available after quiz feedback
    QuizHint { cue: u64 },
}

/// Sends deferred actions to the application loop
#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Deferred>,
}

/// Create a scheduler and the receiver the application loop drains
pub fn channel() -> (Scheduler, mpsc::UnboundedReceiver<Deferred>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Scheduler { tx }, rx)
}

impl Scheduler {
    /// Deliver `action` on the next loop iteration
    pub fn now(&self, action: Deferred) {
        if self.tx.send(action).is_err() {
            debug!("application loop gone, dropping deferred action");
        }
    }

    /// Deliver `action` after `delay`; abort the handle to cancel
    pub fn after(&self, delay: Duration, action: Deferred) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.now(action);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_after_waits() {
        let (scheduler, mut rx) = channel();
        let start = Instant::now();

        scheduler.after(Duration::from_millis(1500), Deferred::OpenPicker);
        scheduler.now(Deferred::Navigate(Route::Quiz));

        assert_eq!(rx.recv().await, Some(Deferred::Navigate(Route::Quiz)));
        assert_eq!(rx.recv().await, Some(Deferred::OpenPicker));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_action_never_arrives() {
        let (scheduler, mut rx) = channel();

        let handle = scheduler.after(Duration::from_millis(500), Deferred::OpenPicker);
        handle.abort();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(rx.try_recv().is_err());
    }
}
