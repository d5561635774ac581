//! Async run API for streamed app-generation endpoints.
//!
//! The transport opens the SSE response body; the run task feeds it through
//! an [`appgen_core::StreamSession`] and publishes normalized [`RunEvent`]s
//! until the artifact arrives or the stream fails.
//!
//! ```no_run
//! use appgen_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HarnessError> {
//! let generator = Generator::from_env()?;
//! let artifact = generator
//!     .generate(GenerationRequest::new("A habit tracker with weekly charts"))
//!     .await?;
//!
//! println!("{}", artifact.published_app_link);
//! # Ok(())
//! # }
//! ```

/// Environment-driven client configuration.
pub mod config;
/// Public error types used by the harness API.
pub mod errors;
/// reqwest-backed transport.
pub mod http;
/// Logging initialisation.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Generator, run stream and cancellation handle.
pub mod run;
/// Normalized run events.
pub mod stream;
/// Transport contract and request body.
pub mod transport;

pub use appgen_core::{AccumulatedMessage, Artifact, DataType};
pub use config::ClientConfig;
pub use errors::{HarnessError, RunFailure, TransportError};
pub use http::HttpTransport;
pub use run::{AbortHandle, GenerationStream, Generator, RunOptions};
pub use stream::RunEvent;
pub use transport::{ChunkStream, GenerationRequest, GenerationTransport};
