use std::time::Duration;

use crate::errors::HarnessError;

const API_KEY_VAR: &str = "APPGEN_API_KEY";
const ENDPOINT_VAR: &str = "APPGEN_ENDPOINT";
const TIMEOUT_VAR: &str = "APPGEN_TIMEOUT_SECS";

/// Configuration for the HTTP transport.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Full URL of the streaming generation endpoint.
    pub endpoint: String,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Optional limit on the whole request, body included.
    ///
    /// Generation runs stream for minutes, so this is unset by default.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a config with default timeouts.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(30),
            timeout: None,
        }
    }

    /// Builds a config from `APPGEN_API_KEY`, `APPGEN_ENDPOINT` and the
    /// optional `APPGEN_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, HarnessError> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| HarnessError::Config(format!("missing {key}")))
        };
        let mut config = Self::new(required(API_KEY_VAR)?, required(ENDPOINT_VAR)?);
        if let Some(raw) = lookup(TIMEOUT_VAR).filter(|v| !v.trim().is_empty()) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                HarnessError::Config(format!("{TIMEOUT_VAR} must be a whole number of seconds"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets an overall request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), HarnessError> {
        if self.api_key.trim().is_empty() {
            return Err(HarnessError::Config("api_key must not be empty".into()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(HarnessError::Config(format!(
                "endpoint must be an http(s) URL, got `{}`",
                self.endpoint
            )));
        }
        Ok(())
    }
}
