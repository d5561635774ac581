use tracing::{debug, warn};

use crate::accumulator::{ApplyOutcome, MessageAccumulator};
use crate::artifact::{Artifact, extract_artifact};
use crate::envelope::{DataType, Envelope, EnvelopeBody};
use crate::errors::{ArtifactError, ChunkError, SessionError};
use crate::framer::StreamFramer;

/// Observable effect of one applied envelope, in framing order.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A message was created (or an open one was replaced), with the text
    /// its creation envelope carried.
    Created {
        message_id: String,
        data_type: DataType,
        result: String,
        error: String,
    },
    /// Text was appended to an open message.
    Updated {
        message_id: String,
        result: String,
        error: String,
    },
    /// A message reached its terminal state.
    Finalized {
        message_id: String,
        data_type: DataType,
    },
    /// The run's artifact was decoded. Emitted at most once per session.
    ArtifactReady(Artifact),
}

/// Counters describing how a session's input was consumed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionStats {
    /// Records that carried a payload.
    pub records: u64,
    /// Payloads dropped because they did not decode into an envelope.
    pub skipped_records: u64,
    /// Envelopes that changed accumulated state.
    pub applied: u64,
    /// Envelopes tolerated as protocol anomalies (unknown id, after final).
    pub ignored: u64,
}

/// Drives one response body: frames chunks, decodes envelopes, accumulates
/// messages and watches for the artifact.
#[derive(Debug, Default)]
pub struct StreamSession {
    framer: StreamFramer,
    accumulator: MessageAccumulator,
    artifact: Option<Artifact>,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one transport chunk and returns what it changed.
    ///
    /// Malformed records are skipped. A final artifact message whose result
    /// does not decode stops processing and is returned as an error carrying
    /// the events applied before it; records after it stay buffered.
    pub fn push_chunk(&mut self, chunk: impl AsRef<[u8]>) -> Result<Vec<SessionEvent>, ChunkError> {
        self.framer.feed(chunk);
        let mut events = Vec::new();
        while let Some(payload) = self.framer.next_payload() {
            self.stats.records += 1;
            match Envelope::decode(&payload) {
                Ok(envelope) => {
                    if let Err(source) = self.apply_envelope(envelope, &mut events) {
                        return Err(ChunkError { events, source });
                    }
                }
                Err(err) => {
                    self.stats.skipped_records += 1;
                    warn!(error = %err, "skipping malformed SSE record");
                }
            }
        }
        Ok(events)
    }

    /// Applies an already decoded envelope, appending its effects to `events`.
    pub fn apply_envelope(
        &mut self,
        envelope: Envelope,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), ArtifactError> {
        let outcome = self.accumulator.apply(&envelope);
        if !outcome.is_applied() {
            self.stats.ignored += 1;
            return Ok(());
        }
        self.stats.applied += 1;

        let Envelope {
            message_id, body, ..
        } = envelope;
        match (outcome, body) {
            (
                ApplyOutcome::Created { .. } | ApplyOutcome::Replaced { .. },
                EnvelopeBody::Creation(data),
            ) => {
                events.push(SessionEvent::Created {
                    message_id: message_id.clone(),
                    data_type: data.data_type,
                    result: data.result.unwrap_or_default(),
                    error: data.error.unwrap_or_default(),
                });
            }
            (_, EnvelopeBody::Update(delta)) => {
                events.push(SessionEvent::Updated {
                    message_id: message_id.clone(),
                    result: delta.result.unwrap_or_default(),
                    error: delta.error.unwrap_or_default(),
                });
            }
            _ => {}
        }

        if outcome.became_final() {
            self.on_finalized(&message_id, events)?;
        }
        Ok(())
    }

    fn on_finalized(
        &mut self,
        message_id: &str,
        events: &mut Vec<SessionEvent>,
    ) -> Result<(), ArtifactError> {
        let Some(message) = self.accumulator.get(message_id) else {
            return Ok(());
        };
        debug!(message_id, data_type = %message.data_type, "message final");
        events.push(SessionEvent::Finalized {
            message_id: message_id.to_string(),
            data_type: message.data_type,
        });
        if message.data_type != DataType::ArtifactOutput {
            return Ok(());
        }
        if self.artifact.is_some() {
            warn!(message_id, "ignoring additional artifact message");
            return Ok(());
        }
        if let Some(artifact) = extract_artifact(message)? {
            debug!(message_id, app_id = %artifact.app_id, version = %artifact.version, "artifact extracted");
            events.push(SessionEvent::ArtifactReady(artifact.clone()));
            self.artifact = Some(artifact);
        }
        Ok(())
    }

    /// The artifact, once a final artifact message has been decoded.
    pub fn current_artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn accumulator(&self) -> &MessageAccumulator {
        &self.accumulator
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Ends the session after the transport closed.
    pub fn finish(self) -> Result<Artifact, SessionError> {
        if self.framer.buffered_len() > 0 {
            debug!(
                bytes = self.framer.buffered_len(),
                "discarding unterminated SSE record"
            );
        }
        self.artifact.ok_or(SessionError::Incomplete)
    }
}
