use std::fmt;

use crate::errors::EnvelopeError;

/// Kind of content a message carries, fixed by its creation envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    ToolCall,
    ToolResult,
    ArtifactOutput,
    /// Any kind this crate does not know about yet.
    #[serde(other)]
    Unknown,
}

impl DataType {
    /// Wire name of the data type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ArtifactOutput => "artifact_output",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial content of a message (`data` on a creation envelope).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageData {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageData {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            result: None,
            error: None,
        }
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Text to append to an existing message (`delta` on an update envelope).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageDelta {
    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// What an envelope does to the message it names.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvelopeBody {
    /// Starts a new message.
    Creation(MessageData),
    /// Appends to a message created earlier.
    Update(MessageDelta),
}

/// One decoded SSE payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub message_id: String,
    pub body: EnvelopeBody,
    pub is_final: bool,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    message_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<MessageData>,
    delta: Option<MessageDelta>,
    is_final: Option<bool>,
}

impl Envelope {
    /// Builds a creation envelope.
    pub fn creation(message_id: impl Into<String>, data: MessageData, is_final: bool) -> Self {
        Self {
            message_id: message_id.into(),
            body: EnvelopeBody::Creation(data),
            is_final,
        }
    }

    /// Builds an update envelope.
    pub fn update(message_id: impl Into<String>, delta: MessageDelta, is_final: bool) -> Self {
        Self {
            message_id: message_id.into(),
            body: EnvelopeBody::Update(delta),
            is_final,
        }
    }

    /// Decodes one framed payload.
    ///
    /// `messageId` and `type` are required, and a creation must carry `data`.
    /// A missing `isFinal` reads as `false` and a missing `delta` as an empty
    /// delta.
    pub fn decode(payload: &str) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_str(payload)?;
        let message_id = wire
            .message_id
            .ok_or(EnvelopeError::MissingField { field: "messageId" })?;
        let kind = wire
            .kind
            .ok_or(EnvelopeError::MissingField { field: "type" })?;
        let body = match kind.as_str() {
            "creation" => EnvelopeBody::Creation(
                wire.data
                    .ok_or(EnvelopeError::MissingField { field: "data" })?,
            ),
            "update" => EnvelopeBody::Update(wire.delta.unwrap_or_default()),
            _ => return Err(EnvelopeError::UnknownKind { kind }),
        };
        Ok(Self {
            message_id,
            body,
            is_final: wire.is_final.unwrap_or(false),
        })
    }

    pub fn is_creation(&self) -> bool {
        matches!(self.body, EnvelopeBody::Creation(_))
    }
}
