use appgen_core::{AccumulatedMessage, Artifact, DataType};

use crate::errors::RunFailure;

/// Normalized events exposed by `GenerationStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// First event for every run.
    Started { run_id: uuid::Uuid },
    /// The remote agent started a new message. `result` and `error` hold the
    /// text its creation envelope carried; later text arrives as deltas.
    MessageCreated {
        run_id: uuid::Uuid,
        message_id: String,
        data_type: DataType,
        result: String,
        error: String,
    },
    /// Text appended to an open message.
    MessageDelta {
        run_id: uuid::Uuid,
        seq: u64,
        message_id: String,
        result: String,
        error: String,
    },
    /// A message reached its final state.
    MessageCompleted {
        run_id: uuid::Uuid,
        message: AccumulatedMessage,
    },
    /// Terminal success event carrying the artifact.
    Completed {
        run_id: uuid::Uuid,
        artifact: Artifact,
    },
    /// Terminal failure event.
    Error {
        run_id: uuid::Uuid,
        error: RunFailure,
    },
}

impl RunEvent {
    /// True for `Completed` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}
