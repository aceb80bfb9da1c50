//! Envelope codec for the multilang line protocol.
//!
//! Every message in either direction is a single JSON object on its own line,
//! discriminated by an `action` field. Inbound lines are first parsed into an
//! [`Envelope`] holding the tag and the whole object; the action decoder then
//! re-reads the object against the shape its tag requires. Outbound control
//! messages are modelled by [`OutboundMessage`].
//!
//! The codec does not split lines itself. That is the job of the
//! [`LineTransport`](crate::transport::LineTransport), which reads exactly one
//! line per call from the shared input stream.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MultilangError;

/// Name of the discriminator field carried by every message.
pub const ACTION_FIELD: &str = "action";

/// Tag used for checkpoint requests and their acknowledgements.
pub const CHECKPOINT_ACTION: &str = "checkpoint";

/// Tag used for completion acknowledgements.
pub const STATUS_ACTION: &str = "status";

/// The closed set of actions the orchestrator may request.
///
/// # Example
///
/// ```
/// use kcl_multilang::protocol::ActionKind;
///
/// let kind = ActionKind::parse("processRecords").expect("known tag");
/// assert_eq!(kind, ActionKind::ProcessRecords);
/// assert_eq!(kind.as_str(), "processRecords");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// First message of every session; carries the shard assignment.
    Initialize,
    /// A batch of records to process.
    ProcessRecords,
    /// The lease on the shard has been lost to another worker.
    LeaseLost,
    /// The shard has been fully consumed.
    ShardEnded,
    /// The orchestrator is shutting down and offers a final checkpoint.
    ShutdownRequested,
}

impl ActionKind {
    /// Every action kind, in protocol order.
    pub const ALL: [Self; 5] = [
        Self::Initialize,
        Self::ProcessRecords,
        Self::LeaseLost,
        Self::ShardEnded,
        Self::ShutdownRequested,
    ];

    /// Parses a wire tag. Tags are case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::UnsupportedAction`] for tags outside the
    /// closed set.
    pub fn parse(tag: &str) -> Result<Self, MultilangError> {
        match tag {
            "initialize" => Ok(Self::Initialize),
            "processRecords" => Ok(Self::ProcessRecords),
            "leaseLost" => Ok(Self::LeaseLost),
            "shardEnded" => Ok(Self::ShardEnded),
            "shutdownRequested" => Ok(Self::ShutdownRequested),
            other => Err(MultilangError::unsupported_action(other)),
        }
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ProcessRecords => "processRecords",
            Self::LeaseLost => "leaseLost",
            Self::ShardEnded => "shardEnded",
            Self::ShutdownRequested => "shutdownRequested",
        }
    }

    /// Returns whether the loop stops reading after this action.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::LeaseLost | Self::ShardEnded)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound line: its `action` tag plus the full JSON object.
///
/// The tag is always present. It may name an action outside the closed set;
/// such envelopes can be inspected but not decoded further.
///
/// # Example
///
/// ```
/// use kcl_multilang::protocol::Envelope;
///
/// let envelope = Envelope::decode(r#"{"action":"leaseLost"}"#).expect("valid line");
/// assert_eq!(envelope.action(), "leaseLost");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    action: String,
    payload: Value,
}

impl Envelope {
    /// Parses one line of text into an envelope.
    ///
    /// Trailing whitespace, including the line terminator, is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Parse`] if the line is empty, is not a JSON
    /// object, or lacks a string `action` field.
    pub fn decode(line: &str) -> Result<Self, MultilangError> {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return Err(MultilangError::parse("empty protocol line"));
        }

        let object: Map<String, Value> =
            serde_json::from_str(trimmed).map_err(MultilangError::from_json_error)?;
        let action = match object.get(ACTION_FIELD) {
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => {
                return Err(MultilangError::parse(format!(
                    "'{ACTION_FIELD}' field must be a string"
                )));
            }
            None => {
                return Err(MultilangError::parse(format!(
                    "message is missing the '{ACTION_FIELD}' field"
                )));
            }
        };

        Ok(Self {
            action,
            payload: Value::Object(object),
        })
    }

    /// Returns the raw `action` tag.
    #[must_use]
    pub const fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Resolves the tag against the closed set of actions.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::UnsupportedAction`] for unknown tags.
    pub fn kind(&self) -> Result<ActionKind, MultilangError> {
        ActionKind::parse(&self.action)
    }

    /// Returns the full JSON object the envelope was parsed from.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Re-reads the payload as a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Parse`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, MultilangError> {
        T::deserialize(&self.payload).map_err(MultilangError::from_json_error)
    }
}

/// Control messages written to the orchestrator.
///
/// # Example
///
/// ```
/// use kcl_multilang::protocol::{ActionKind, OutboundMessage};
///
/// let line = OutboundMessage::status(ActionKind::ShardEnded)
///     .encode()
///     .expect("status encodes");
/// assert_eq!(line, r#"{"action":"status","responseFor":"shardEnded"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Request that the orchestrator record a checkpoint.
    #[serde(rename_all = "camelCase")]
    Checkpoint {
        /// Position to record; absent means "the whole processed batch".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<String>,
        /// Refinement within `sequence_number`, for aggregated records.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_sequence_number: Option<u64>,
    },
    /// Acknowledges that an action has been fully handled.
    #[serde(rename_all = "camelCase")]
    Status {
        /// Tag of the action being acknowledged.
        response_for: String,
    },
}

impl OutboundMessage {
    /// Creates a completion acknowledgement for the given action.
    #[must_use]
    pub fn status(kind: ActionKind) -> Self {
        Self::Status {
            response_for: kind.as_str().to_owned(),
        }
    }

    /// Returns the discriminator this message is written with.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Checkpoint { .. } => CHECKPOINT_ACTION,
            Self::Status { .. } => STATUS_ACTION,
        }
    }

    /// Serialises the message as a single line, without the terminator.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::Encode`] if serialisation fails.
    pub fn encode(&self) -> Result<String, MultilangError> {
        serde_json::to_string(self).map_err(MultilangError::Encode)
    }
}
