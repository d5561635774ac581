use std::pin::Pin;

use crate::errors::TransportError;

/// Response body of a generation request as ordered raw chunks.
///
/// Dropping the stream releases the underlying connection.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Body of a generation request.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// What to build.
    pub prompt: String,
    /// Existing app to iterate on instead of starting a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Additional endpoint-specific fields, sent at the top level.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerationRequest {
    /// Creates a request for a new app.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            app_id: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Targets an existing app.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Adds an extra top-level field to the request body.
    pub fn field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Opens the streamed response body for a generation request.
///
/// Status codes, authentication and timeouts are the transport's concern; the
/// run only sees chunks, a read error, or the end of the stream.
#[async_trait::async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open_stream(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError>;
}
