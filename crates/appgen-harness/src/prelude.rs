//! Common imports for typical harness usage.
pub use crate::{
    AbortHandle, Artifact, ClientConfig, DataType, GenerationRequest, GenerationStream, Generator,
    HarnessError, HttpTransport, RunEvent, RunFailure,
};
