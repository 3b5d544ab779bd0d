//! Streaming structured generation.
//!
//! [`StreamingGenerator::start`] spawns one generation per session key and
//! hands back a [`GenerationStream`]. Partial objects are forwarded as they
//! grow; the final object is validated against its activity schema before
//! `complete` is sent. Cancelling stops delivery immediately and suppresses
//! `complete`. Starting again with `regenerate` cancels the in-flight
//! generation for that key and begins a fresh request.
//!
//! A session key stays busy until its generation finishes or its consumer
//! cancels or drops the [`GenerationStream`], whichever happens first.

use prepwise_core::activity::ActivityContent;
use prepwise_core::error::GenerationError;
use prepwise_core::message::render_prompt;
use prepwise_core::provider::Provider;
use prepwise_telemetry::ObservabilityLogger;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::partial::PartialObjectAssembler;
use crate::request::GenerationRequest;
use crate::stream_event::GenerationEvent;

const EVENT_BUFFER: usize = 32;

/// Shared cancellation flag for one generation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Sessions = Arc<Mutex<HashMap<String, Session>>>;

/// Consumer side of a streaming generation.
pub struct GenerationStream {
    session_key: String,
    id: u64,
    events: mpsc::Receiver<GenerationEvent>,
    cancel: CancelHandle,
    sessions: Sessions,
}

impl GenerationStream {
    /// The next event, or `None` once the stream has ended or been cancelled.
    pub async fn next(&mut self) -> Option<GenerationEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let event = self.events.recv().await?;
        // A cancel that raced the receive still wins.
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(event)
    }

    /// Stop the generation and free its session key.
    pub fn cancel(&self) {
        self.cancel.cancel();
        release(&self.sessions, &self.session_key, self.id);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Drain the stream into a vector.
    pub async fn collect(mut self) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Session {
    id: u64,
    cancel: CancelHandle,
}

pub struct StreamingGenerator {
    logger: Arc<ObservabilityLogger>,
    sessions: Sessions,
    next_id: AtomicU64,
}

impl StreamingGenerator {
    pub fn new(logger: Arc<ObservabilityLogger>) -> Self {
        Self {
            logger,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Begin streaming `request` under `session_key`.
    ///
    /// Fails with [`GenerationError::AlreadyStreaming`] when the key already
    /// has a generation in flight, unless `regenerate` is set, in which case
    /// the old one is cancelled first. Must be called within a Tokio runtime.
    pub fn start(
        &self,
        provider: Arc<dyn Provider>,
        session_key: impl Into<String>,
        request: GenerationRequest,
        regenerate: bool,
    ) -> Result<GenerationStream, GenerationError> {
        let session_key = session_key.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelHandle::default();

        {
            let mut sessions = lock(&self.sessions);
            if let Some(existing) = sessions.get(&session_key) {
                if !regenerate {
                    return Err(GenerationError::AlreadyStreaming(session_key));
                }
                info!(session = %session_key, "Regenerating, discarding in-flight stream");
                existing.cancel.cancel();
            }
            sessions.insert(
                session_key.clone(),
                Session {
                    id,
                    cancel: cancel.clone(),
                },
            );
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let logger = self.logger.clone();
        let sessions = self.sessions.clone();
        let key = session_key.clone();
        let driver_cancel = cancel.clone();
        tokio::spawn(async move {
            drive(provider, request, logger, tx, driver_cancel).await;
            release(&sessions, &key, id);
        });

        Ok(GenerationStream {
            session_key,
            id,
            events: rx,
            cancel,
            sessions: self.sessions.clone(),
        })
    }

    /// Cancel the generation running under `session_key`, if any.
    pub fn cancel(&self, session_key: &str) -> bool {
        match lock(&self.sessions).remove(session_key) {
            Some(session) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_streaming(&self, session_key: &str) -> bool {
        lock(&self.sessions).contains_key(session_key)
    }
}

fn lock(sessions: &Mutex<HashMap<String, Session>>) -> MutexGuard<'_, HashMap<String, Session>> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

/// Remove `key` only if it still belongs to generation `id`.
fn release(sessions: &Mutex<HashMap<String, Session>>, key: &str, id: u64) {
    let mut sessions = lock(sessions);
    if sessions.get(key).is_some_and(|s| s.id == id) {
        sessions.remove(key);
    }
}

async fn drive(
    provider: Arc<dyn Provider>,
    request: GenerationRequest,
    logger: Arc<ObservabilityLogger>,
    tx: mpsc::Sender<GenerationEvent>,
    cancel: CancelHandle,
) {
    let kind = request.kind;
    let mut span = logger
        .begin(&request.task, &request.model)
        .with_prompt(render_prompt(&request.messages()));
    if let Some(user) = &request.user_id {
        span = span.with_user(user);
    }

    let mut chunks = match provider.stream(request.to_provider_request(true)).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(activity = %kind, error = %e, "Failed to start stream");
            let message = e.to_string();
            logger.finish_error(span, &e).await;
            let _ = tx.send(GenerationEvent::Error { message }).await;
            return;
        }
    };

    let mut assembler = PartialObjectAssembler::new();
    let mut usage = None;
    let mut partials = 0usize;

    while let Some(item) = chunks.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(activity = %kind, error = %e, "Stream interrupted");
                let message = e.to_string();
                logger.finish_error(span, &e).await;
                let _ = tx.send(GenerationEvent::Error { message }).await;
                return;
            }
        };

        if let Some(model) = &chunk.model {
            span.served_by(model);
        }
        if let Some(delta) = chunk.content.as_deref().filter(|d| !d.is_empty()) {
            span.first_token();
            if let Some(object) = assembler.push(delta) {
                partials += 1;
                if tx.send(GenerationEvent::Partial { object }).await.is_err() {
                    // Consumer went away.
                    cancel.cancel();
                    break;
                }
            }
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    if cancel.is_cancelled() {
        debug!(activity = %kind, partials, "Stream cancelled");
        logger.finish_error(span, &GenerationError::Cancelled).await;
        return;
    }

    let result = assembler
        .finish()
        .ok_or(GenerationError::Incomplete)
        .and_then(|value| ActivityContent::parse(kind, value));

    match result {
        Ok(content) => {
            let model = span.model().to_string();
            logger
                .finish_success(span, assembler.text(), usage)
                .await;
            debug!(activity = %kind, partials, %model, "Stream complete");
            let _ = tx
                .send(GenerationEvent::Complete {
                    content,
                    model,
                    usage,
                })
                .await;
        }
        Err(e) => {
            warn!(activity = %kind, error = %e, "Streamed object rejected");
            let message = e.to_string();
            logger.finish_error(span, &e).await;
            let _ = tx.send(GenerationEvent::Error { message }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedStreamProvider, logger};
    use prepwise_core::activity::ActivityKind;
    use prepwise_core::log::{LogSink, LogStatus};
    use std::time::Duration;

    const FLASHCARDS: [&str; 4] = [
        r#"{"type": "flashcards", "title": "Rust""#,
        r#", "cards": [{"front": "Borrow", "back": "A reference"}"#,
        r#", {"front": "Move", "back": "Owner"#,
        r#"ship transfer"}]}"#,
    ];

    fn request() -> GenerationRequest {
        GenerationRequest::new(ActivityKind::Flashcards, "mock-model", "Rust ownership").with_user("user-1")
    }

    async fn wait_for_log(store: &prepwise_store::InMemoryStore) -> prepwise_core::log::GenerationLogEntry {
        for _ in 0..200 {
            if let Some(entry) = store.recent(1).await.unwrap().into_iter().next() {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no log entry written");
    }

    #[tokio::test]
    async fn streams_partials_then_complete() {
        let (logger, store) = logger();
        let generator = StreamingGenerator::new(logger);
        let stream = generator
            .start(Arc::new(ScriptedStreamProvider::new(&FLASHCARDS)), "s1", request(), false)
            .unwrap();

        let events = stream.collect().await;
        assert_eq!(events.len(), 5);
        assert!(events[..4].iter().all(|e| e.event_type() == "partial"));

        match &events[1] {
            GenerationEvent::Partial { object } => assert_eq!(object["cards"][0]["front"], "Borrow"),
            other => panic!("unexpected {other:?}"),
        }
        match &events[4] {
            GenerationEvent::Complete { content, model, usage } => {
                assert_eq!(content.title(), "Rust");
                assert_eq!(model, "mock-model");
                assert_eq!(usage.unwrap().prompt_tokens, 100);
                match content {
                    ActivityContent::Flashcards { cards, .. } => {
                        assert_eq!(cards[1].back, "Ownership transfer")
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }

        let entry = wait_for_log(&store).await;
        assert_eq!(entry.status, LogStatus::Success);
        assert_eq!(entry.action, "generate_flashcards");
        assert!(entry.time_to_first_token_ms.is_some());
        assert_eq!(entry.token_usage.output, 40);
    }

    #[tokio::test]
    async fn cancelled_stream_never_completes() {
        let (logger, store) = logger();
        let generator = StreamingGenerator::new(logger);
        let provider = ScriptedStreamProvider::new(&FLASHCARDS).with_pause(Duration::from_millis(50));
        let mut stream = generator.start(Arc::new(provider), "s1", request(), false).unwrap();

        for _ in 0..2 {
            let event = stream.next().await.unwrap();
            assert_eq!(event.event_type(), "partial");
        }
        stream.cancel();
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());

        let entry = wait_for_log(&store).await;
        assert_eq!(entry.status, LogStatus::Error);
        assert!(entry.error_message.unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn second_start_needs_regenerate() {
        let (logger, _) = logger();
        let generator = StreamingGenerator::new(logger);
        let slow = Arc::new(ScriptedStreamProvider::new(&FLASHCARDS).with_pause(Duration::from_millis(50)));

        let mut first = generator.start(slow.clone(), "s1", request(), false).unwrap();
        assert!(generator.is_streaming("s1"));
        assert!(matches!(
            generator.start(slow.clone(), "s1", request(), false),
            Err(GenerationError::AlreadyStreaming(key)) if key == "s1"
        ));

        // Another key is independent.
        let other = generator.start(slow.clone(), "s2", request(), false).unwrap();
        drop(other);

        let second = generator.start(slow, "s1", request(), true).unwrap();
        assert!(first.next().await.is_none());

        let events = second.collect().await;
        assert_eq!(events.last().map(|e| e.event_type()), Some("complete"));
    }

    #[tokio::test]
    async fn consumer_cancel_frees_the_session_key() {
        let (logger, _) = logger();
        let generator = StreamingGenerator::new(logger);
        let slow = Arc::new(ScriptedStreamProvider::new(&FLASHCARDS).with_pause(Duration::from_millis(50)));

        let mut stream = generator.start(slow.clone(), "s1", request(), false).unwrap();
        assert!(stream.next().await.is_some());
        stream.cancel();

        assert!(!generator.is_streaming("s1"));
        let restarted = generator.start(slow, "s1", request(), false).unwrap();
        // The old stream's drop must not release the new session.
        drop(stream);
        assert!(generator.is_streaming("s1"));

        let events = restarted.collect().await;
        assert_eq!(events.last().map(|e| e.event_type()), Some("complete"));
    }

    #[tokio::test]
    async fn dropping_the_stream_frees_the_session_key() {
        let (logger, _) = logger();
        let generator = StreamingGenerator::new(logger);
        let slow = Arc::new(ScriptedStreamProvider::new(&FLASHCARDS).with_pause(Duration::from_millis(50)));

        drop(generator.start(slow.clone(), "s1", request(), false).unwrap());
        assert!(!generator.is_streaming("s1"));
        assert!(generator.start(slow, "s1", request(), false).is_ok());
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn driver_future_is_send() {
        let (logger, _) = logger();
        let (tx, _rx) = mpsc::channel(1);
        let provider: Arc<dyn Provider> = Arc::new(ScriptedStreamProvider::new(&FLASHCARDS));
        assert_send(drive(provider, request(), logger, tx, CancelHandle::default()));
    }

    #[tokio::test]
    async fn session_is_released_after_completion() {
        let (logger, _) = logger();
        let generator = StreamingGenerator::new(logger);
        let provider = Arc::new(ScriptedStreamProvider::new(&FLASHCARDS));

        let stream = generator.start(provider.clone(), "s1", request(), false).unwrap();
        stream.collect().await;
        for _ in 0..200 {
            if !generator.is_streaming("s1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(generator.start(provider, "s1", request(), false).is_ok());
    }

    #[tokio::test]
    async fn invalid_final_object_is_an_error() {
        let (logger, store) = logger();
        let generator = StreamingGenerator::new(logger);
        // MCQ answer index out of range.
        let provider = Arc::new(ScriptedStreamProvider::new(&[
            r#"{"title": "Sorting", "questions": [{"question": "Fastest?", "#,
            r#""options": ["a", "b"], "answer_index": 5}]}"#,
        ]));
        let request = GenerationRequest::new(ActivityKind::Mcq, "mock-model", "sorting");

        let events = generator.start(provider, "s1", request, false).unwrap().collect().await;
        let last = events.last().unwrap();
        assert_eq!(last.event_type(), "error");
        assert!(events.iter().all(|e| e.event_type() != "complete"));

        let entry = wait_for_log(&store).await;
        assert_eq!(entry.status, LogStatus::Error);
    }

    #[tokio::test]
    async fn truncated_stream_is_incomplete() {
        let (logger, _) = logger();
        let generator = StreamingGenerator::new(logger);
        let provider = Arc::new(ScriptedStreamProvider::new(&[r#"{"title": "Half"#]));
        let request = GenerationRequest::new(ActivityKind::Flashcards, "mock-model", "x");

        let events = generator.start(provider, "s1", request, false).unwrap().collect().await;
        match events.last().unwrap() {
            GenerationEvent::Error { message } => {
                assert_eq!(message, &GenerationError::Incomplete.to_string())
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
