//! Incremental reassembly of streamed app-generation runs.
//!
//! A generation endpoint streams Server-Sent Events whose payloads are JSON
//! envelopes. Each envelope either creates a message or appends a delta to
//! one; the run ends with a final `artifact_output` message whose result is
//! the published app.
//!
//! ```
//! use appgen_core::{SessionEvent, StreamSession};
//!
//! let mut session = StreamSession::new();
//! let events = session
//!     .push_chunk("data: {\"messageId\":\"m1\",\"type\":\"creation\",\"data\":{\"type\":\"text\",\"result\":\"hi\"},\"isFinal\":true}\n\n")
//!     .expect("no artifact in this stream");
//! assert!(matches!(events.last(), Some(SessionEvent::Finalized { .. })));
//! assert_eq!(session.accumulator().get("m1").map(|m| m.result.as_str()), Some("hi"));
//! ```

/// Folding creation/update envelopes into per-message state.
pub mod accumulator;
/// The run's final artifact and its extractor.
pub mod artifact;
/// Wire envelope types and decoding.
pub mod envelope;
/// Error types for decoding, extraction and session completion.
pub mod errors;
/// SSE record framing over raw transport chunks.
pub mod framer;
/// The driving loop tying framer, accumulator and extractor together.
pub mod session;

pub use accumulator::{AccumulatedMessage, ApplyOutcome, MessageAccumulator};
pub use artifact::{Artifact, extract_artifact};
pub use envelope::{DataType, Envelope, EnvelopeBody, MessageData, MessageDelta};
pub use errors::{ArtifactError, ChunkError, EnvelopeError, SessionError};
pub use framer::{FrameDrain, StreamFramer};
pub use session::{SessionEvent, SessionStats, StreamSession};
