use std::collections::HashMap;

use tracing::{debug, warn};

use crate::envelope::{DataType, Envelope, EnvelopeBody};

/// Current reconstructed state of one logical message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedMessage {
    pub message_id: String,
    pub data_type: DataType,
    pub result: String,
    pub error: String,
    pub is_final: bool,
}

/// What a single [`MessageAccumulator::apply`] call did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApplyOutcome {
    /// A creation envelope started a new message.
    Created { became_final: bool },
    /// A creation envelope overwrote a message that was still open.
    Replaced { became_final: bool },
    /// Deltas were appended to an open message.
    Updated { became_final: bool },
    /// Update for an id that was never created.
    IgnoredUnknown,
    /// Envelope for a message that is already final.
    IgnoredFinal,
}

impl ApplyOutcome {
    /// True when this call moved the message to its terminal state.
    pub fn became_final(&self) -> bool {
        match self {
            Self::Created { became_final }
            | Self::Replaced { became_final }
            | Self::Updated { became_final } => *became_final,
            Self::IgnoredUnknown | Self::IgnoredFinal => false,
        }
    }

    /// True when the envelope changed accumulated state.
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::IgnoredUnknown | Self::IgnoredFinal)
    }
}

/// Folds creation and update envelopes into per-message state for one
/// streaming session.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    messages: HashMap<String, AccumulatedMessage>,
    // Ids in the order they first became final.
    finished: Vec<String>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one envelope. Must be called in framing order.
    ///
    /// Protocol anomalies (unknown id, mutation after final) are tolerated and
    /// reported through the returned outcome rather than as errors.
    ///
    /// A repeated creation replaces the message only while it is open. Once a
    /// message is final nothing changes it, a later creation included: that
    /// returns `IgnoredFinal`.
    pub fn apply(&mut self, envelope: &Envelope) -> ApplyOutcome {
        let id = envelope.message_id.as_str();
        match &envelope.body {
            EnvelopeBody::Creation(data) => {
                let replaced = match self.messages.get(id) {
                    Some(existing) if existing.is_final => {
                        warn!(message_id = id, "ignoring creation for final message");
                        return ApplyOutcome::IgnoredFinal;
                    }
                    Some(_) => {
                        warn!(message_id = id, "duplicate creation, replacing open message");
                        true
                    }
                    None => false,
                };
                debug!(message_id = id, data_type = %data.data_type, is_final = envelope.is_final, "message created");
                self.messages.insert(
                    id.to_string(),
                    AccumulatedMessage {
                        message_id: id.to_string(),
                        data_type: data.data_type,
                        result: data.result.clone().unwrap_or_default(),
                        error: data.error.clone().unwrap_or_default(),
                        is_final: envelope.is_final,
                    },
                );
                if envelope.is_final {
                    self.finished.push(id.to_string());
                }
                let became_final = envelope.is_final;
                if replaced {
                    ApplyOutcome::Replaced { became_final }
                } else {
                    ApplyOutcome::Created { became_final }
                }
            }
            EnvelopeBody::Update(delta) => {
                let Some(message) = self.messages.get_mut(id) else {
                    debug!(message_id = id, "ignoring update for unknown message");
                    return ApplyOutcome::IgnoredUnknown;
                };
                if message.is_final {
                    warn!(message_id = id, "ignoring update for final message");
                    return ApplyOutcome::IgnoredFinal;
                }
                if let Some(result) = &delta.result {
                    message.result.push_str(result);
                }
                if let Some(error) = &delta.error {
                    message.error.push_str(error);
                }
                message.is_final = envelope.is_final;
                if envelope.is_final {
                    self.finished.push(id.to_string());
                }
                ApplyOutcome::Updated {
                    became_final: envelope.is_final,
                }
            }
        }
    }

    /// Current state of a message, if it has been created.
    pub fn get(&self, message_id: &str) -> Option<&AccumulatedMessage> {
        self.messages.get(message_id)
    }

    /// Every accumulated message, in no particular order.
    pub fn messages(&self) -> impl Iterator<Item = &AccumulatedMessage> {
        self.messages.values()
    }

    /// Terminal messages in the order they became final.
    pub fn finished(&self) -> impl Iterator<Item = &AccumulatedMessage> {
        self.finished.iter().filter_map(|id| self.messages.get(id))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
