use crate::accumulator::AccumulatedMessage;
use crate::envelope::DataType;
use crate::errors::ArtifactError;

/// Final result of a generation run, embedded as JSON in the `result` of the
/// terminal `artifact_output` message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub published_app_link: String,
    pub source_code_archive_link: String,
    pub app_id: String,
    pub version: String,
}

/// Decodes the artifact carried by `message`.
///
/// Returns `Ok(None)` while the message is not a final `artifact_output`
/// message, and an error when it is final but its result does not decode.
pub fn extract_artifact(message: &AccumulatedMessage) -> Result<Option<Artifact>, ArtifactError> {
    if message.data_type != DataType::ArtifactOutput || !message.is_final {
        return Ok(None);
    }
    serde_json::from_str(&message.result)
        .map(Some)
        .map_err(|source| ArtifactError::Corrupt {
            message_id: message.message_id.clone(),
            source,
        })
}
