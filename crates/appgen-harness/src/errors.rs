use appgen_core::ArtifactError;

/// Errors raised by a transport while opening or reading the response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (DNS, TLS, connect, timeout).
    #[error("request failed: {message}")]
    Request { message: String },
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reading the streamed body failed after it started.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a body read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// HTTP status code, when the endpoint answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request { .. } | Self::Read { .. } => None,
        }
    }
}

/// Terminal run failure sent through `RunEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum RunFailure {
    /// Opening or reading the stream failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The artifact message finished but its result could not be decoded.
    #[error("corrupt artifact in message {message_id}: {message}")]
    CorruptArtifact { message_id: String, message: String },
    /// The stream closed before an artifact was produced.
    #[error("stream ended without an artifact")]
    Incomplete,
    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,
}

/// Top-level error type for the public harness API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid request passed to the run API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport error surfaced outside a run.
    #[error(transparent)]
    Transport(TransportError),
    /// Terminal failure returned from a started run.
    #[error(transparent)]
    RunFailed(RunFailure),
    /// Internal channel misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HarnessError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<RunFailure> for HarnessError {
    fn from(value: RunFailure) -> Self {
        HarnessError::RunFailed(value)
    }
}

impl From<TransportError> for HarnessError {
    fn from(value: TransportError) -> Self {
        HarnessError::Transport(value)
    }
}

impl From<&TransportError> for RunFailure {
    fn from(err: &TransportError) -> Self {
        RunFailure::Transport {
            message: err.to_string(),
        }
    }
}

impl From<&ArtifactError> for RunFailure {
    fn from(err: &ArtifactError) -> Self {
        match err {
            ArtifactError::Corrupt { message_id, source } => RunFailure::CorruptArtifact {
                message_id: message_id.clone(),
                message: source.to_string(),
            },
        }
    }
}
