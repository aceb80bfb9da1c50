//! Synchronous checkpoint exchange with the orchestrator.
//!
//! A checkpoint is a request line written to the output followed by exactly
//! one acknowledgement line read back from the shared input. The read must
//! happen immediately after the write, before the dispatch loop reads its
//! next action, or an acknowledgement would be mistaken for an action request.
//! [`StreamCheckpointer`] guarantees this by holding the transport mutably for
//! as long as it exists.

use std::io::{BufRead, Write};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::MultilangError;
use crate::protocol::{CHECKPOINT_ACTION, OutboundMessage};
use crate::transport::LineTransport;

/// Tracing target for checkpoint operations.
const CHECKPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::checkpoint");

/// Position to checkpoint at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointRequest {
    /// Everything delivered so far; the orchestrator infers the position.
    Batch,
    /// A specific sequence number.
    Sequence {
        /// Sequence number to record.
        sequence_number: String,
    },
    /// A specific record within an aggregated sequence number.
    SubSequence {
        /// Sequence number to record.
        sequence_number: String,
        /// Sub-sequence number within `sequence_number`.
        sub_sequence_number: u64,
    },
}

impl CheckpointRequest {
    /// Creates a request for a specific sequence number.
    #[must_use]
    pub fn at(sequence_number: impl Into<String>) -> Self {
        Self::Sequence {
            sequence_number: sequence_number.into(),
        }
    }

    /// Creates a request for a specific sub-sequence number.
    #[must_use]
    pub fn at_sub_sequence(sequence_number: impl Into<String>, sub_sequence_number: u64) -> Self {
        Self::SubSequence {
            sequence_number: sequence_number.into(),
            sub_sequence_number,
        }
    }

    /// Builds the wire message for this request.
    #[must_use]
    pub fn to_message(&self) -> OutboundMessage {
        match self {
            Self::Batch => OutboundMessage::Checkpoint {
                sequence_number: None,
                sub_sequence_number: None,
            },
            Self::Sequence { sequence_number } => OutboundMessage::Checkpoint {
                sequence_number: Some(sequence_number.clone()),
                sub_sequence_number: None,
            },
            Self::SubSequence {
                sequence_number,
                sub_sequence_number,
            } => OutboundMessage::Checkpoint {
                sequence_number: Some(sequence_number.clone()),
                sub_sequence_number: Some(*sub_sequence_number),
            },
        }
    }
}

/// The orchestrator's answer to a checkpoint request.
///
/// The orchestrator sends `subSequenceNumber` either as a number or as a
/// decimal string; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointAck {
    #[serde(default)]
    sequence_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_sub_sequence")]
    sub_sequence_number: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl CheckpointAck {
    /// Returns the sequence number the orchestrator recorded.
    #[must_use]
    pub fn sequence_number(&self) -> Option<&str> {
        self.sequence_number.as_deref()
    }

    /// Returns the sub-sequence number the orchestrator recorded.
    #[must_use]
    pub const fn sub_sequence_number(&self) -> Option<u64> {
        self.sub_sequence_number
    }

    /// Returns the rejection reason, if the checkpoint was refused.
    #[must_use]
    pub fn rejection(&self) -> Option<&str> {
        self.error.as_deref().filter(|reason| !reason.is_empty())
    }

    /// Returns whether the checkpoint was recorded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.rejection().is_none()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn deserialize_sub_sequence<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(value)) => Ok(Some(value)),
        Some(NumberOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|error| D::Error::custom(format!("invalid subSequenceNumber '{text}': {error}"))),
    }
}

/// Capability handed to record processors for recording progress.
///
/// Every call blocks until the orchestrator acknowledges it.
///
/// # Example
///
/// ```
/// use kcl_multilang::action::ProcessRecordsAction;
/// use kcl_multilang::checkpoint::Checkpointer;
/// use kcl_multilang::MultilangError;
///
/// fn checkpoint_last(
///     batch: &ProcessRecordsAction,
///     checkpointer: &mut dyn Checkpointer,
/// ) -> Result<(), MultilangError> {
///     if let Some(record) = batch.last_record() {
///         checkpointer.checkpoint_at_sub_sequence(
///             record.sequence_number(),
///             record.sub_sequence_number(),
///         )?;
///     }
///     Ok(())
/// }
/// ```
pub trait Checkpointer {
    /// Checkpoints everything delivered so far.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::CheckpointRejected`] if the orchestrator
    /// refuses the checkpoint, or a parse or transport error if the exchange
    /// itself fails.
    fn checkpoint_batch(&mut self) -> Result<CheckpointAck, MultilangError>;

    /// Checkpoints at a sequence number.
    ///
    /// # Errors
    ///
    /// As for [`Checkpointer::checkpoint_batch`].
    fn checkpoint_at(&mut self, sequence_number: &str) -> Result<CheckpointAck, MultilangError>;

    /// Checkpoints at a sub-sequence number within a sequence number.
    ///
    /// # Errors
    ///
    /// As for [`Checkpointer::checkpoint_batch`].
    fn checkpoint_at_sub_sequence(
        &mut self,
        sequence_number: &str,
        sub_sequence_number: u64,
    ) -> Result<CheckpointAck, MultilangError>;

    /// Checkpoints at the position described by `request`.
    ///
    /// # Errors
    ///
    /// As for [`Checkpointer::checkpoint_batch`].
    fn checkpoint(&mut self, request: &CheckpointRequest) -> Result<CheckpointAck, MultilangError> {
        match request {
            CheckpointRequest::Batch => self.checkpoint_batch(),
            CheckpointRequest::Sequence { sequence_number } => self.checkpoint_at(sequence_number),
            CheckpointRequest::SubSequence {
                sequence_number,
                sub_sequence_number,
            } => self.checkpoint_at_sub_sequence(sequence_number, *sub_sequence_number),
        }
    }
}

/// Checkpointer that exchanges lines over the shared transport.
#[derive(Debug)]
pub struct StreamCheckpointer<'a, R, W> {
    transport: &'a mut LineTransport<R, W>,
}

impl<'a, R, W> StreamCheckpointer<'a, R, W> {
    /// Wraps a transport. See [`LineTransport::checkpointer`].
    #[must_use]
    pub const fn new(transport: &'a mut LineTransport<R, W>) -> Self {
        Self { transport }
    }
}

impl<R: BufRead, W: Write> StreamCheckpointer<'_, R, W> {
    fn exchange(&mut self, request: &CheckpointRequest) -> Result<CheckpointAck, MultilangError> {
        debug!(target: CHECKPOINT_TARGET, ?request, "sending checkpoint request");
        self.transport.write_message(&request.to_message())?;

        let envelope = self.transport.read_envelope()?;
        if envelope.action() != CHECKPOINT_ACTION {
            return Err(MultilangError::unexpected_action(
                format!("a '{CHECKPOINT_ACTION}' acknowledgement"),
                envelope.action(),
            ));
        }

        let ack: CheckpointAck = envelope.payload_as()?;
        if let Some(reason) = ack.rejection() {
            warn!(target: CHECKPOINT_TARGET, ?request, reason, "checkpoint rejected");
            return Err(MultilangError::checkpoint_rejected(reason));
        }

        debug!(
            target: CHECKPOINT_TARGET,
            sequence_number = ack.sequence_number(),
            sub_sequence_number = ack.sub_sequence_number(),
            "checkpoint recorded"
        );
        Ok(ack)
    }
}

impl<R: BufRead, W: Write> Checkpointer for StreamCheckpointer<'_, R, W> {
    fn checkpoint_batch(&mut self) -> Result<CheckpointAck, MultilangError> {
        self.exchange(&CheckpointRequest::Batch)
    }

    fn checkpoint_at(&mut self, sequence_number: &str) -> Result<CheckpointAck, MultilangError> {
        self.exchange(&CheckpointRequest::at(sequence_number))
    }

    fn checkpoint_at_sub_sequence(
        &mut self,
        sequence_number: &str,
        sub_sequence_number: u64,
    ) -> Result<CheckpointAck, MultilangError> {
        self.exchange(&CheckpointRequest::at_sub_sequence(
            sequence_number,
            sub_sequence_number,
        ))
    }

    fn checkpoint(&mut self, request: &CheckpointRequest) -> Result<CheckpointAck, MultilangError> {
        self.exchange(request)
    }
}
