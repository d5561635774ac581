/// A framed payload that could not be turned into an [`Envelope`](crate::Envelope).
///
/// The driving loop treats every variant as a malformed record: it is logged
/// and skipped, never surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Payload text was not valid JSON or had a field of the wrong shape.
    #[error("invalid envelope JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// A field the wire schema requires was absent.
    #[error("envelope is missing required field `{field}`")]
    MissingField { field: &'static str },
    /// The `type` discriminator was neither `creation` nor `update`.
    #[error("unknown envelope type `{kind}`")]
    UnknownKind { kind: String },
}

/// A terminal `artifact_output` message whose result could not be decoded.
///
/// This is the one condition the extractor reports instead of treating it as
/// "no artifact yet": the run nominally finished but its output is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact in message `{message_id}` is corrupt: {source}")]
    Corrupt {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ArtifactError {
    /// Id of the message carrying the corrupt artifact.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Corrupt { message_id, .. } => message_id,
        }
    }
}

/// Terminal outcome of a session that did not yield a usable artifact.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The stream ended before any artifact message became final.
    #[error("stream ended without an artifact")]
    Incomplete,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// A corrupt artifact hit while consuming one chunk, together with the events
/// of the envelopes that chunk applied before it.
///
/// Those envelopes are already part of the accumulated state, so their events
/// are handed back instead of being lost with the error.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct ChunkError {
    pub events: Vec<crate::session::SessionEvent>,
    pub source: ArtifactError,
}

impl ChunkError {
    /// Id of the message carrying the corrupt artifact.
    pub fn message_id(&self) -> &str {
        self.source.message_id()
    }
}
