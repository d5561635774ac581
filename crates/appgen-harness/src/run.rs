use std::sync::Arc;

use appgen_core::{Artifact, ChunkError, SessionError, SessionEvent, StreamSession};
use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::errors::{HarnessError, RunFailure};
use crate::http::HttpTransport;
use crate::stream::RunEvent;
use crate::transport::{GenerationRequest, GenerationTransport};

/// Handle used to request cancellation of a running generation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort and becomes visible as a terminal
    /// `RunEvent::Error` with `RunFailure::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Behavior options shared by every run a `Generator` starts.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Close the stream as soon as the artifact is decoded instead of draining
    /// it to the end.
    pub stop_on_artifact: bool,
    /// Bounded event buffer size used by the run channel.
    pub event_buffer_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stop_on_artifact: true,
            event_buffer_capacity: 128,
        }
    }
}

/// Entry point for starting generation runs over a transport.
#[derive(Clone)]
pub struct Generator {
    transport: Arc<dyn GenerationTransport>,
    options: RunOptions,
}

impl Generator {
    /// Creates a generator over any transport.
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self {
            transport,
            options: RunOptions::default(),
        }
    }

    /// Creates a generator over the HTTP transport configured from the
    /// environment.
    pub fn from_env() -> Result<Self, HarnessError> {
        Ok(Self::new(Arc::new(HttpTransport::from_env()?)))
    }

    /// Sets whether runs stop reading once the artifact is decoded.
    pub fn stop_on_artifact(mut self, stop: bool) -> Self {
        self.options.stop_on_artifact = stop;
        self
    }

    /// Sets the bounded event buffer size between the run task and the
    /// consumer.
    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.event_buffer_capacity = capacity;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Validates the request and starts a streaming run.
    ///
    /// The returned `GenerationStream` yields `Started`, message events, and a
    /// terminal `Completed`/`Error` event.
    pub async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, HarnessError> {
        if request.prompt.trim().is_empty() {
            return Err(HarnessError::Validation("prompt must not be empty".into()));
        }
        if self.options.event_buffer_capacity == 0 {
            return Err(HarnessError::Validation(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }

        let (tx, rx) = mpsc::channel(self.options.event_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let run_id = uuid::Uuid::new_v4();
        tokio::spawn(run_task(
            self.transport.clone(),
            request,
            self.options.clone(),
            run_id,
            tx,
            final_tx,
            abort_rx,
        ));

        Ok(GenerationStream {
            run_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }

    /// Runs to completion and returns the artifact.
    pub async fn generate(&self, request: GenerationRequest) -> Result<Artifact, HarnessError> {
        self.start(request).await?.finish().await
    }
}

/// Streaming handle returned by `Generator::start`.
///
/// Use `next_event()` to follow progress and `finish()` to obtain the
/// artifact after the terminal event.
pub struct GenerationStream {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<RunEvent>,
    final_rx: oneshot::Receiver<Result<Artifact, HarnessError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl GenerationStream {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next run event.
    ///
    /// Returns `None` after the channel is closed.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(RunEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains the stream (if needed) and returns the terminal run result.
    pub async fn finish(mut self) -> Result<Artifact, HarnessError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::protocol_msg(format!(
                "run task ended without final result (run_id={})",
                self.run_id
            ))),
        }
    }
}

#[instrument(name = "generation_run", skip_all, fields(run_id = %run_id))]
async fn run_task(
    transport: Arc<dyn GenerationTransport>,
    request: GenerationRequest,
    options: RunOptions,
    run_id: uuid::Uuid,
    tx: mpsc::Sender<RunEvent>,
    final_tx: oneshot::Sender<Result<Artifact, HarnessError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    if !send_event(&tx, RunEvent::Started { run_id }).await {
        let _ = final_tx.send(Err(HarnessError::protocol_msg(
            "run stream receiver dropped before Started",
        )));
        return;
    }
    info!(run_id = %run_id, app_id = ?request.app_id, "generation run started");

    let opened = tokio::select! {
        _ = aborted(&mut abort_rx) => Err(RunFailure::Cancelled),
        opened = transport.open_stream(&request) => opened.map_err(|err| RunFailure::from(&err)),
    };
    let mut chunks = match opened {
        Ok(chunks) => chunks,
        Err(failure) => {
            conclude(&tx, final_tx, run_id, Err(failure)).await;
            return;
        }
    };

    let mut session = StreamSession::new();
    let mut seq = 0_u64;
    let outcome = loop {
        tokio::select! {
            _ = aborted(&mut abort_rx) => break Err(RunFailure::Cancelled),
            next = chunks.next() => match next {
                Some(Ok(chunk)) => {
                    let (events, corrupt) = match session.push_chunk(&chunk) {
                        Ok(events) => (events, None),
                        Err(ChunkError { events, source }) => (events, Some(source)),
                    };
                    for event in events {
                        let Some(run_event) = to_run_event(run_id, &session, event, &mut seq) else {
                            continue;
                        };
                        if !send_event(&tx, run_event).await {
                            let _ = final_tx.send(Err(HarnessError::protocol_msg(
                                "run stream receiver dropped during output",
                            )));
                            return;
                        }
                    }
                    if let Some(err) = corrupt {
                        break Err(RunFailure::from(&err));
                    }
                    if options.stop_on_artifact
                        && let Some(artifact) = session.current_artifact()
                    {
                        debug!(run_id = %run_id, "artifact received, closing stream");
                        break Ok(artifact.clone());
                    }
                }
                Some(Err(err)) => break Err(RunFailure::from(&err)),
                None => break session_outcome(session),
            },
        }
    };
    // Release the connection before reporting the outcome.
    drop(chunks);
    conclude(&tx, final_tx, run_id, outcome).await;
}

fn session_outcome(session: StreamSession) -> Result<Artifact, RunFailure> {
    let stats = session.stats();
    debug!(
        records = stats.records,
        skipped = stats.skipped_records,
        applied = stats.applied,
        ignored = stats.ignored,
        "generation stream closed"
    );
    session.finish().map_err(|err| match err {
        SessionError::Incomplete => RunFailure::Incomplete,
        SessionError::Artifact(err) => RunFailure::from(&err),
    })
}

fn to_run_event(
    run_id: uuid::Uuid,
    session: &StreamSession,
    event: SessionEvent,
    seq: &mut u64,
) -> Option<RunEvent> {
    match event {
        SessionEvent::Created {
            message_id,
            data_type,
            result,
            error,
        } => Some(RunEvent::MessageCreated {
            run_id,
            message_id,
            data_type,
            result,
            error,
        }),
        SessionEvent::Updated {
            message_id,
            result,
            error,
        } => {
            if result.is_empty() && error.is_empty() {
                return None;
            }
            let event = RunEvent::MessageDelta {
                run_id,
                seq: *seq,
                message_id,
                result,
                error,
            };
            *seq = seq.saturating_add(1);
            Some(event)
        }
        SessionEvent::Finalized { message_id, .. } => session
            .accumulator()
            .get(&message_id)
            .cloned()
            .map(|message| RunEvent::MessageCompleted { run_id, message }),
        // Reported once, as the terminal `Completed` event.
        SessionEvent::ArtifactReady(_) => None,
    }
}

async fn conclude(
    tx: &mpsc::Sender<RunEvent>,
    final_tx: oneshot::Sender<Result<Artifact, HarnessError>>,
    run_id: uuid::Uuid,
    outcome: Result<Artifact, RunFailure>,
) {
    match outcome {
        Ok(artifact) => {
            info!(run_id = %run_id, app_id = %artifact.app_id, version = %artifact.version, "generation run completed");
            let sent = send_event(
                tx,
                RunEvent::Completed {
                    run_id,
                    artifact: artifact.clone(),
                },
            )
            .await;
            let _ = final_tx.send(if sent {
                Ok(artifact)
            } else {
                Err(HarnessError::protocol_msg(
                    "run stream receiver dropped before completion",
                ))
            });
        }
        Err(failure) => {
            warn!(run_id = %run_id, error = %failure, "generation run failed");
            let _ = send_event(
                tx,
                RunEvent::Error {
                    run_id,
                    error: failure.clone(),
                },
            )
            .await;
            let _ = final_tx.send(Err(HarnessError::RunFailed(failure)));
        }
    }
}

// Resolves once cancellation is requested; never resolves if every abort
// handle is gone.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn send_event(tx: &mpsc::Sender<RunEvent>, event: RunEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::transport::ChunkStream;
    use appgen_core::DataType;
    use bytes::Bytes;
    use futures::StreamExt as _;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type Chunk = Result<Bytes, TransportError>;

    enum FakeBehavior {
        OpenError(TransportError),
        Chunks { chunks: Vec<Chunk>, then_hang: bool },
    }

    struct FakeTransport {
        behavior: FakeBehavior,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicBool>,
    }

    struct ReleaseGuard(Arc<AtomicBool>);

    impl Drop for ReleaseGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl GenerationTransport for FakeTransport {
        async fn open_stream(
            &self,
            _request: &GenerationRequest,
        ) -> Result<ChunkStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                FakeBehavior::OpenError(err) => Err(err.clone()),
                FakeBehavior::Chunks { chunks, then_hang } => {
                    let guard = ReleaseGuard(self.released.clone());
                    let tail = if *then_hang {
                        stream::pending::<Chunk>().boxed()
                    } else {
                        stream::empty::<Chunk>().boxed()
                    };
                    let chunks = stream::iter(chunks.clone()).chain(tail).map(move |item| {
                        let _guard = &guard;
                        item
                    });
                    Ok(Box::pin(chunks))
                }
            }
        }
    }

    struct Fixture {
        generator: Generator,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicBool>,
    }

    fn fixture(behavior: FakeBehavior) -> Fixture {
        let opened = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let transport = FakeTransport {
            behavior,
            opened: opened.clone(),
            released: released.clone(),
        };
        Fixture {
            generator: Generator::new(Arc::new(transport)),
            opened,
            released,
        }
    }

    fn streaming(body: &str, then_hang: bool) -> FakeBehavior {
        let chunks = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        FakeBehavior::Chunks { chunks, then_hang }
    }

    fn record(value: serde_json::Value) -> String {
        format!("data: {value}\n\n")
    }

    fn artifact_json() -> String {
        serde_json::json!({
            "publishedAppLink": "https://x",
            "sourceCodeArchiveLink": "https://y",
            "appId": "a1",
            "version": "0.0.1",
        })
        .to_string()
    }

    fn text_records(id: &str) -> String {
        record(serde_json::json!({"messageId": id, "type": "creation", "data": {"type": "text", "result": "Bui"}, "isFinal": false}))
            + &record(serde_json::json!({"messageId": id, "type": "update", "delta": {"result": "lding"}, "isFinal": true}))
    }

    fn artifact_record(result: &str) -> String {
        record(serde_json::json!({"messageId": "art", "type": "creation", "data": {"type": "artifact_output", "result": result}, "isFinal": true}))
    }

    async fn collect_until_terminal(stream: &mut GenerationStream) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    fn expected_artifact() -> Artifact {
        Artifact {
            published_app_link: "https://x".into(),
            source_code_archive_link: "https://y".into(),
            app_id: "a1".into(),
            version: "0.0.1".into(),
        }
    }

    #[tokio::test]
    async fn completes_with_artifact_and_streams_message_events() {
        let body = text_records("t1") + &artifact_record(&artifact_json());
        let fx = fixture(streaming(&body, false));
        let mut stream = fx
            .generator
            .start(GenerationRequest::new("todo app"))
            .await
            .expect("start");
        let run_id = stream.run_id();

        let events = collect_until_terminal(&mut stream).await;
        assert_eq!(events.first(), Some(&RunEvent::Started { run_id }));
        assert_eq!(
            events.get(1),
            Some(&RunEvent::MessageCreated {
                run_id,
                message_id: "t1".into(),
                data_type: DataType::Text,
                result: "Bui".into(),
                error: String::new(),
            })
        );
        assert!(events.contains(&RunEvent::MessageDelta {
            run_id,
            seq: 0,
            message_id: "t1".into(),
            result: "lding".into(),
            error: String::new(),
        }));
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::MessageCompleted { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].result, "Building");
        assert_eq!(completed[1].data_type, DataType::ArtifactOutput);
        assert_eq!(
            events.last(),
            Some(&RunEvent::Completed {
                run_id,
                artifact: expected_artifact(),
            })
        );

        assert_eq!(stream.finish().await.expect("finish"), expected_artifact());
        assert_eq!(fx.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_on_artifact_releases_stream_without_waiting_for_close() {
        let body = artifact_record(&artifact_json()) + &text_records("late");
        let fx = fixture(streaming(&body, true));
        let artifact = fx
            .generator
            .generate(GenerationRequest::new("todo app"))
            .await
            .expect("artifact");
        assert_eq!(artifact, expected_artifact());
        assert!(fx.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn draining_mode_reads_to_end_of_stream() {
        let body = artifact_record(&artifact_json()) + &text_records("late");
        let fx = fixture(streaming(&body, false));
        let generator = fx.generator.clone().stop_on_artifact(false);
        let mut stream = generator
            .start(GenerationRequest::new("todo app"))
            .await
            .expect("start");

        let events = collect_until_terminal(&mut stream).await;
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::MessageCompleted { message, .. } if message.message_id == "late"
        )));
        assert!(matches!(events.last(), Some(RunEvent::Completed { .. })));
        assert_eq!(stream.finish().await.expect("finish"), expected_artifact());
    }

    #[tokio::test]
    async fn stream_end_without_artifact_is_incomplete() {
        let fx = fixture(streaming(&text_records("t1"), false));
        let result = fx.generator.generate(GenerationRequest::new("todo app")).await;
        assert_eq!(result, Err(HarnessError::RunFailed(RunFailure::Incomplete)));
        assert!(fx.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn corrupt_artifact_fails_the_run() {
        let fx = fixture(streaming(&artifact_record("not json"), true));
        let result = fx.generator.generate(GenerationRequest::new("todo app")).await;
        assert!(matches!(
            result,
            Err(HarnessError::RunFailed(RunFailure::CorruptArtifact { message_id, .. })) if message_id == "art"
        ));
    }

    #[tokio::test]
    async fn corrupt_artifact_still_reports_messages_from_the_same_chunk() {
        let body = record(serde_json::json!({"messageId": "t1", "type": "creation", "data": {"type": "text", "result": "Planning"}, "isFinal": true}))
            + &artifact_record("not json");
        let fx = fixture(FakeBehavior::Chunks {
            chunks: vec![Ok(Bytes::from(body))],
            then_hang: true,
        });
        let mut stream = fx
            .generator
            .start(GenerationRequest::new("todo app"))
            .await
            .expect("start");
        let run_id = stream.run_id();

        let events = collect_until_terminal(&mut stream).await;
        assert_eq!(
            events.get(1),
            Some(&RunEvent::MessageCreated {
                run_id,
                message_id: "t1".into(),
                data_type: DataType::Text,
                result: "Planning".into(),
                error: String::new(),
            })
        );
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::MessageCompleted { message, .. } if message.message_id == "t1" && message.result == "Planning"
        )));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Error { error: RunFailure::CorruptArtifact { message_id, .. }, .. }) if message_id == "art"
        ));
        assert!(fx.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn open_error_becomes_terminal_transport_failure() {
        let fx = fixture(FakeBehavior::OpenError(TransportError::Status {
            status: 401,
            body: "invalid key".into(),
        }));
        let mut stream = fx
            .generator
            .start(GenerationRequest::new("todo app"))
            .await
            .expect("start");
        let events = collect_until_terminal(&mut stream).await;
        assert!(matches!(
            events.last(),
            Some(RunEvent::Error { error: RunFailure::Transport { message }, .. }) if message.contains("401")
        ));
        assert!(matches!(
            stream.finish().await,
            Err(HarnessError::RunFailed(RunFailure::Transport { .. }))
        ));
    }

    #[tokio::test]
    async fn read_error_mid_stream_fails_the_run() {
        let fx = fixture(FakeBehavior::Chunks {
            chunks: vec![
                Ok(Bytes::from_static(b"data: {\"messageId\":\"t1\",")),
                Err(TransportError::read("connection reset")),
            ],
            then_hang: false,
        });
        let result = fx.generator.generate(GenerationRequest::new("todo app")).await;
        assert!(matches!(
            result,
            Err(HarnessError::RunFailed(RunFailure::Transport { message })) if message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn cancellation_emits_terminal_error_and_releases_stream() {
        let fx = fixture(FakeBehavior::Chunks {
            chunks: Vec::new(),
            then_hang: true,
        });
        let mut stream = fx
            .generator
            .start(GenerationRequest::new("todo app"))
            .await
            .expect("start");

        let abort = stream.abort_handle();
        let _ = stream.next_event().await;
        abort.abort();

        let events = collect_until_terminal(&mut stream).await;
        assert!(matches!(
            events.last(),
            Some(RunEvent::Error {
                error: RunFailure::Cancelled,
                ..
            })
        ));
        assert_eq!(
            stream.finish().await,
            Err(HarnessError::RunFailed(RunFailure::Cancelled))
        );
        assert!(fx.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn validation_rejects_empty_prompt_and_zero_capacity() {
        let fx = fixture(streaming("", false));
        let err = match fx.generator.start(GenerationRequest::new("  ")).await {
            Ok(_) => panic!("empty prompt should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, HarnessError::Validation(msg) if msg.contains("prompt")));

        let err = match fx
            .generator
            .clone()
            .event_buffer_capacity(0)
            .start(GenerationRequest::new("todo app"))
            .await
        {
            Ok(_) => panic!("zero capacity should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, HarnessError::Validation(msg) if msg.contains("event_buffer_capacity")));
        assert_eq!(fx.opened.load(Ordering::SeqCst), 0);
    }
}
