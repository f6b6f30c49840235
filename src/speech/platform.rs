//! Speech engine backed by a platform text-to-speech service
//!
//! The backend is optional: when the capability check finds nothing, every
//! `speak` completes immediately so callers waiting on `on_end` never hang.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{preview, OnEnd, SpeechEngine, SpeechState};
use crate::events::SpeechEvent;

/// Delay before a `speak` issued while voices are loading is retried
const VOICE_RETRY: Duration = Duration::from_millis(500);

/// Voices count as loaded after this long, even if none showed up
const VOICE_LOAD_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often the voice list is polled while loading
const VOICE_POLL: Duration = Duration::from_millis(100);

/// Backend error codes that only mean "cancelled on purpose"
const EXPECTED_ERRORS: [&str; 2] = ["interrupted", "canceled"];

/// A voice offered by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47 language tag, e.g. `en-US`
    pub lang: String,
}

/// One utterance handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    pub id: u64,
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub lang: String,
}

/// Progress reported by the backend for an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Started { id: u64 },
    Ended { id: u64 },
    Failed { id: u64, code: String },
}

/// Errors a synthesis backend can return
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("failed to launch speech program: {0}")]
    Launch(#[from] std::io::Error),
}

/// Platform speech service: the external collaborator behind [`PlatformSynthesis`]
pub trait SynthesisBackend: Send + Sync + 'static {
    /// Voices currently known; may be empty while the service starts up
    fn voices(&self) -> Vec<Voice>;

    /// Queue `request`, reporting its progress on `events`
    fn speak(
        &self,
        request: UtteranceRequest,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<(), SynthesisError>;

    /// Drop everything queued or playing
    fn cancel(&self);

    fn pause(&self) -> Result<(), SynthesisError>;

    fn resume(&self) -> Result<(), SynthesisError>;
}

/// Speech engine driving an optional [`SynthesisBackend`]
#[derive(Clone)]
pub struct PlatformSynthesis {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Option<Arc<dyn SynthesisBackend>>,
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<SpeechEvent>,
    backend_tx: mpsc::UnboundedSender<BackendEvent>,
}

struct Inner {
    state: SpeechState,
    /// Bumped by every `speak` and `stop`
    generation: u64,
    current: Option<Pending>,
    voices_loaded: bool,
}

struct Pending {
    id: u64,
    text: String,
    on_end: Option<OnEnd>,
}

impl PlatformSynthesis {
    /// Create the engine and start loading voices.
    ///
    /// `backend` is the result of the capability check; `None` gives an
    /// engine that speaks nothing.
    pub fn new(backend: Option<Arc<dyn SynthesisBackend>>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();

        if backend.is_none() {
            warn!("speech synthesis not available, output will be silent");
        }

        let engine = Self {
            shared: Arc::new(Shared {
                backend,
                inner: Mutex::new(Inner {
                    state: SpeechState::Idle,
                    generation: 0,
                    current: None,
                    voices_loaded: false,
                }),
                event_tx,
                backend_tx,
            }),
        };

        tokio::spawn(engine.clone().pump(backend_rx));
        tokio::spawn(engine.clone().load_voices());

        engine
    }

    /// Whether the voice list is ready (or the load timeout passed)
    pub fn voices_loaded(&self) -> bool {
        self.lock().voices_loaded
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SpeechEvent) {
        let _ = self.shared.event_tx.send(event);
    }

    async fn load_voices(self) {
        let Some(backend) = self.shared.backend.clone() else {
            self.lock().voices_loaded = true;
            return;
        };

        let deadline = Instant::now() + VOICE_LOAD_TIMEOUT;
        loop {
            let count = backend.voices().len();
            if count > 0 {
                debug!(count, "voices loaded");
                break;
            }
            if Instant::now() >= deadline {
                warn!("no voices reported, continuing with the default voice");
                break;
            }
            tokio::time::sleep(VOICE_POLL).await;
        }
        self.lock().voices_loaded = true;
    }

    /// Process progress reports from the backend
    async fn pump(self, mut backend_rx: mpsc::UnboundedReceiver<BackendEvent>) {
        while let Some(event) = backend_rx.recv().await {
            match event {
                BackendEvent::Started { id } => self.on_started(id),
                BackendEvent::Ended { id } => self.on_ended(id),
                BackendEvent::Failed { id, code } => self.on_failed(id, &code),
            }
        }
    }

    /// The backend began playing `id`. State already left Idle when the
    /// request was handed over; a pause issued before this arrives stands.
    fn on_started(&self, id: u64) {
        let text = match self.lock().current.as_ref() {
            Some(current) if current.id == id => current.text.clone(),
            _ => return,
        };

        self.emit(SpeechEvent::Started {
            text: preview(&text),
            duration_ms: None,
        });
    }

    fn on_ended(&self, id: u64) {
        let Some(on_end) = self.finish(id) else {
            return;
        };
        self.emit(SpeechEvent::Finished);
        if let Some(on_end) = on_end {
            on_end();
        }
    }

    fn on_failed(&self, id: u64, code: &str) {
        if EXPECTED_ERRORS.contains(&code) {
            debug!(id, code, "utterance cancelled");
            let cleared = {
                let mut inner = self.lock();
                let current = inner.current.as_ref().is_some_and(|current| current.id == id);
                if current {
                    inner.current = None;
                    inner.state = SpeechState::Idle;
                }
                current
            };
            // Cancelled outside of `stop`, so nobody has reported it yet
            if cleared {
                self.emit(SpeechEvent::Stopped);
            }
            return;
        }

        error!(id, code, "speech synthesis error");
        let Some(on_end) = self.finish(id) else {
            return;
        };
        self.emit(SpeechEvent::Failed {
            code: code.to_string(),
        });
        if let Some(on_end) = on_end {
            on_end();
        }
    }

    /// Clear utterance `id` if it is still current, returning its callback
    fn finish(&self, id: u64) -> Option<Option<OnEnd>> {
        let mut inner = self.lock();
        match inner.current.as_ref() {
            Some(current) if current.id == id => {}
            _ => return None,
        }
        inner.state = SpeechState::Idle;
        inner.current.take().map(|mut pending| pending.on_end.take())
    }

    /// Speak on behalf of request `generation`, unless something newer came in
    fn speak_as(&self, generation: u64, text: String, on_end: Option<OnEnd>) {
        let Some(backend) = self.shared.backend.clone() else {
            debug!("speech synthesis not available, completing immediately");
            if let Some(on_end) = on_end {
                on_end();
            }
            return;
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "retried utterance superseded");
            return;
        }

        if !inner.voices_loaded {
            drop(inner);
            warn!("voices not loaded yet, retrying");
            let engine = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(VOICE_RETRY).await;
                engine.speak_as(generation, text, on_end);
            });
            return;
        }

        backend.cancel();

        let request = UtteranceRequest {
            id: generation,
            text: text.clone(),
            voice: english_voice(&backend.voices()),
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
            lang: "en-US".to_string(),
        };

        info!(text = %preview(&text), voice = ?request.voice.as_ref().map(|v| &v.name), "speaking");

        inner.current = Some(Pending {
            id: generation,
            text,
            on_end,
        });
        inner.state = SpeechState::Speaking;

        if let Err(e) = backend.speak(request, self.shared.backend_tx.clone()) {
            error!(?e, "speech synthesis error");
            inner.state = SpeechState::Idle;
            let on_end = inner.current.take().and_then(|mut pending| pending.on_end.take());
            drop(inner);
            if let Some(on_end) = on_end {
                on_end();
            }
        }
    }
}

/// First voice whose language is English
fn english_voice(voices: &[Voice]) -> Option<Voice> {
    voices.iter().find(|voice| voice.lang.starts_with("en")).cloned()
}

impl SpeechEngine for PlatformSynthesis {
    fn speak(&self, text: &str, on_end: Option<OnEnd>) {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.generation
        };
        self.speak_as(generation, text.to_string(), on_end);
    }

    fn pause(&self) {
        let Some(backend) = &self.shared.backend else {
            return;
        };
        let mut inner = self.lock();
        if inner.state != SpeechState::Speaking {
            return;
        }
        match backend.pause() {
            Ok(()) => {
                inner.state = SpeechState::Paused;
                drop(inner);
                info!("speech paused");
                self.emit(SpeechEvent::Paused);
            }
            Err(e) => error!(?e, "error pausing speech"),
        }
    }

    fn resume(&self) {
        let Some(backend) = &self.shared.backend else {
            return;
        };
        let mut inner = self.lock();
        if inner.state != SpeechState::Paused {
            return;
        }
        match backend.resume() {
            Ok(()) => {
                inner.state = SpeechState::Speaking;
                drop(inner);
                info!("speech resumed");
                self.emit(SpeechEvent::Resumed);
            }
            Err(e) => error!(?e, "error resuming speech"),
        }
    }

    fn stop(&self) {
        let Some(backend) = &self.shared.backend else {
            return;
        };
        let had_current = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = SpeechState::Idle;
            inner.current.take().is_some()
        };
        backend.cancel();

        info!("speech stopped");
        if had_current {
            self.emit(SpeechEvent::Stopped);
        }
    }

    fn state(&self) -> SpeechState {
        self.lock().state
    }

    fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.shared.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend that records requests and lets the test drive progress
    #[derive(Default)]
    struct FakeBackend {
        voices: Mutex<Vec<Voice>>,
        requests: Mutex<Vec<UtteranceRequest>>,
        sink: Mutex<Option<mpsc::UnboundedSender<BackendEvent>>>,
        cancels: Mutex<u32>,
        pausable: bool,
    }

    impl FakeBackend {
        fn with_english() -> Self {
            let backend = Self {
                pausable: true,
                ..Self::default()
            };
            *backend.voices.lock().unwrap() = vec![
                Voice {
                    name: "fr".to_string(),
                    lang: "fr-FR".to_string(),
                },
                Voice {
                    name: "en-us".to_string(),
                    lang: "en-US".to_string(),
                },
            ];
            backend
        }

        fn report(&self, event: BackendEvent) {
            let sink = self.sink.lock().unwrap();
            sink.as_ref().unwrap().send(event).unwrap();
        }

        fn last_id(&self) -> u64 {
            self.requests.lock().unwrap().last().unwrap().id
        }
    }

    impl SynthesisBackend for FakeBackend {
        fn voices(&self) -> Vec<Voice> {
            self.voices.lock().unwrap().clone()
        }

        fn speak(
            &self,
            request: UtteranceRequest,
            events: mpsc::UnboundedSender<BackendEvent>,
        ) -> Result<(), SynthesisError> {
            self.requests.lock().unwrap().push(request);
            *self.sink.lock().unwrap() = Some(events);
            Ok(())
        }

        fn cancel(&self) {
            *self.cancels.lock().unwrap() += 1;
        }

        fn pause(&self) -> Result<(), SynthesisError> {
            if self.pausable {
                Ok(())
            } else {
                Err(SynthesisError::Unsupported("pause"))
            }
        }

        fn resume(&self) -> Result<(), SynthesisError> {
            Ok(())
        }
    }

    fn flag_callback() -> (Arc<AtomicBool>, OnEnd) {
        let flag = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&flag);
        (flag, Box::new(move || inner.store(true, Ordering::SeqCst)))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn ready(backend: Arc<FakeBackend>) -> PlatformSynthesis {
        let engine = PlatformSynthesis::new(Some(backend as Arc<dyn SynthesisBackend>));
        settle().await;
        assert!(engine.voices_loaded());
        engine
    }

    #[tokio::test]
    async fn test_missing_backend_completes_immediately() {
        let engine = PlatformSynthesis::new(None);
        let (ended, cb) = flag_callback();

        engine.speak("nobody hears this", Some(cb));

        assert!(ended.load(Ordering::SeqCst));
        assert_eq!(engine.state(), SpeechState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_uses_english_voice() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;

        engine.speak("Welcome back", None);

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].voice.as_ref().unwrap().lang, "en-US");
        assert_eq!(requests[0].rate, 0.9);
        assert_eq!(requests[0].lang, "en-US");
        assert_eq!(*backend.cancels.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_lifecycle_drives_state() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;
        let (ended, cb) = flag_callback();

        engine.speak("Question one", Some(cb));
        let id = backend.last_id();

        backend.report(BackendEvent::Started { id });
        settle().await;
        assert_eq!(engine.state(), SpeechState::Speaking);

        engine.pause();
        assert_eq!(engine.state(), SpeechState::Paused);
        engine.resume();
        assert_eq!(engine.state(), SpeechState::Speaking);

        backend.report(BackendEvent::Ended { id });
        settle().await;
        assert!(ended.load(Ordering::SeqCst));
        assert_eq!(engine.state(), SpeechState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_is_swallowed() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;
        let (ended, cb) = flag_callback();

        engine.speak("will be interrupted", Some(cb));
        let id = backend.last_id();
        backend.report(BackendEvent::Started { id });
        backend.report(BackendEvent::Failed {
            id,
            code: "interrupted".to_string(),
        });
        settle().await;

        assert!(!ended.load(Ordering::SeqCst));
        assert_eq!(engine.state(), SpeechState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_current_reports_stopped() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;
        let mut events = engine.subscribe();

        engine.speak("cut off by the device", None);
        let id = backend.last_id();
        backend.report(BackendEvent::Started { id });
        backend.report(BackendEvent::Failed {
            id,
            code: "interrupted".to_string(),
        });
        settle().await;

        assert!(matches!(events.recv().await, Ok(SpeechEvent::Started { .. })));
        assert_eq!(events.recv().await.ok(), Some(SpeechEvent::Stopped));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_stale_utterance_is_silent() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;

        engine.speak("first", None);
        let old = backend.last_id();
        engine.speak("second", None);
        let mut events = engine.subscribe();

        backend.report(BackendEvent::Failed {
            id: old,
            code: "interrupted".to_string(),
        });
        settle().await;

        assert!(events.try_recv().is_err());
        assert_eq!(engine.state(), SpeechState::Speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_right_after_speak() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;

        engine.speak("Topic one", None);
        assert_eq!(engine.state(), SpeechState::Speaking);
        engine.pause();
        assert_eq!(engine.state(), SpeechState::Paused);

        backend.report(BackendEvent::Started {
            id: backend.last_id(),
        });
        settle().await;
        assert_eq!(engine.state(), SpeechState::Paused);

        engine.resume();
        assert_eq!(engine.state(), SpeechState::Speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_error_still_completes() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;
        let mut events = engine.subscribe();
        let (ended, cb) = flag_callback();

        engine.speak("audio device lost", Some(cb));
        let id = backend.last_id();
        backend.report(BackendEvent::Failed {
            id,
            code: "audio-busy".to_string(),
        });
        settle().await;

        assert!(ended.load(Ordering::SeqCst));
        assert_eq!(
            events.recv().await.unwrap(),
            SpeechEvent::Failed {
                code: "audio-busy".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_are_ignored() {
        let backend = Arc::new(FakeBackend::with_english());
        let engine = ready(Arc::clone(&backend)).await;
        let (first, first_cb) = flag_callback();
        let (second, second_cb) = flag_callback();

        engine.speak("first", Some(first_cb));
        let old = backend.last_id();
        engine.speak("second", Some(second_cb));
        let new = backend.last_id();

        backend.report(BackendEvent::Ended { id: old });
        settle().await;
        assert!(!first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));

        backend.report(BackendEvent::Ended { id: new });
        settle().await;
        assert!(second.load(Ordering::SeqCst));
        assert!(!first.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_pause_keeps_state() {
        let backend = Arc::new(FakeBackend {
            pausable: false,
            ..FakeBackend::with_english()
        });
        let engine = ready(Arc::clone(&backend)).await;

        engine.speak("cannot pause this", None);
        backend.report(BackendEvent::Started {
            id: backend.last_id(),
        });
        settle().await;

        engine.pause();
        assert_eq!(engine.state(), SpeechState::Speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_waits_for_voice_timeout() {
        let backend = Arc::new(FakeBackend::default());
        let engine = PlatformSynthesis::new(Some(Arc::clone(&backend) as Arc<dyn SynthesisBackend>));

        engine.speak("early words", None);
        assert!(backend.requests.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "early words");
        assert!(requests[0].voice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_pending_retry() {
        let backend = Arc::new(FakeBackend::default());
        let engine = PlatformSynthesis::new(Some(Arc::clone(&backend) as Arc<dyn SynthesisBackend>));

        engine.speak("never said", None);
        engine.stop();

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        assert!(backend.requests.lock().unwrap().is_empty());
    }
}
