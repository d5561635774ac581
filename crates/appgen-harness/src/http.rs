use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{HarnessError, TransportError};
use crate::transport::{ChunkStream, GenerationRequest, GenerationTransport};

/// Transport that POSTs the request and streams the SSE response body.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport configured from the environment.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::new(ClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl GenerationTransport for HttpTransport {
    async fn open_stream(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError> {
        debug!(endpoint = %self.config.endpoint, app_id = ?request.app_id, "opening generation stream");
        let mut http_req = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        if let Some(timeout) = self.config.timeout {
            http_req = http_req.timeout(timeout);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::request(format!("generation request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
