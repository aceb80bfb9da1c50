//! Typed actions decoded from inbound envelopes.
//!
//! Decoding is a closed five-way match on the envelope's tag. Actions that
//! carry data re-read the envelope payload against their own shape; missing
//! or mistyped fields are parse errors rather than silent defaults, so an
//! empty batch can always be told apart from a malformed one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MultilangError;
use crate::protocol::{ActionKind, Envelope};

/// Shard assignment delivered once, at the start of a session.
///
/// # Example
///
/// ```
/// use kcl_multilang::action::InitAction;
/// use kcl_multilang::protocol::Envelope;
///
/// let envelope = Envelope::decode(
///     r#"{"action":"initialize","shardId":"shard-1","sequenceNumber":"100","subSequenceNumber":0}"#,
/// ).expect("valid line");
/// let init = InitAction::from_envelope(&envelope).expect("initialize payload");
/// assert_eq!(init.shard_id(), "shard-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitAction {
    shard_id: String,
    sequence_number: String,
    sub_sequence_number: u64,
}

impl InitAction {
    /// Creates an initialisation action.
    #[must_use]
    pub fn new(
        shard_id: impl Into<String>,
        sequence_number: impl Into<String>,
        sub_sequence_number: u64,
    ) -> Self {
        Self {
            shard_id: shard_id.into(),
            sequence_number: sequence_number.into(),
            sub_sequence_number,
        }
    }

    /// Decodes an `initialize` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::UnexpectedAction`] if the envelope carries a
    /// different tag, or [`MultilangError::Parse`] if the payload is missing
    /// required fields.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MultilangError> {
        decode_payload(envelope, ActionKind::Initialize)
    }

    /// Returns the shard this processor is responsible for.
    #[must_use]
    pub const fn shard_id(&self) -> &str {
        self.shard_id.as_str()
    }

    /// Returns the sequence number processing starts from.
    #[must_use]
    pub const fn sequence_number(&self) -> &str {
        self.sequence_number.as_str()
    }

    /// Returns the sub-sequence number processing starts from.
    #[must_use]
    pub const fn sub_sequence_number(&self) -> u64 {
        self.sub_sequence_number
    }
}

/// A single record within a `processRecords` batch.
///
/// `data` is passed through exactly as received (base64 text on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    data: String,
    partition_key: String,
    approximate_arrival_timestamp: u64,
    sequence_number: String,
    sub_sequence_number: u64,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(
        data: impl Into<String>,
        partition_key: impl Into<String>,
        approximate_arrival_timestamp: u64,
        sequence_number: impl Into<String>,
        sub_sequence_number: u64,
    ) -> Self {
        Self {
            data: data.into(),
            partition_key: partition_key.into(),
            approximate_arrival_timestamp,
            sequence_number: sequence_number.into(),
            sub_sequence_number,
        }
    }

    /// Returns the record payload as sent by the orchestrator.
    #[must_use]
    pub const fn data(&self) -> &str {
        self.data.as_str()
    }

    /// Returns the partition key.
    #[must_use]
    pub const fn partition_key(&self) -> &str {
        self.partition_key.as_str()
    }

    /// Returns the approximate arrival time as an epoch timestamp.
    #[must_use]
    pub const fn approximate_arrival_timestamp(&self) -> u64 {
        self.approximate_arrival_timestamp
    }

    /// Returns the record's sequence number.
    #[must_use]
    pub const fn sequence_number(&self) -> &str {
        self.sequence_number.as_str()
    }

    /// Returns the sub-sequence number disambiguating aggregated records.
    #[must_use]
    pub const fn sub_sequence_number(&self) -> u64 {
        self.sub_sequence_number
    }
}

/// A batch of records plus how far behind the stream tip it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecordsAction {
    millis_behind_latest: u64,
    records: Vec<Record>,
}

impl ProcessRecordsAction {
    /// Creates a batch.
    #[must_use]
    pub const fn new(records: Vec<Record>, millis_behind_latest: u64) -> Self {
        Self {
            millis_behind_latest,
            records,
        }
    }

    /// Decodes a `processRecords` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::UnexpectedAction`] if the envelope carries a
    /// different tag, or [`MultilangError::Parse`] if `records` or
    /// `millisBehindLatest` is missing or malformed.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, MultilangError> {
        decode_payload(envelope, ActionKind::ProcessRecords)
    }

    /// Returns the records in the order the orchestrator sent them.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the lag behind the newest available data, in milliseconds.
    #[must_use]
    pub const fn millis_behind_latest(&self) -> u64 {
        self.millis_behind_latest
    }

    /// Returns the last record of the batch, if any.
    #[must_use]
    pub fn last_record(&self) -> Option<&Record> {
        self.records.last()
    }
}

/// A fully decoded orchestrator request.
///
/// Serialises back to its wire shape, tag included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    /// Session start.
    Initialize(InitAction),
    /// A batch of records.
    ProcessRecords(ProcessRecordsAction),
    /// The shard lease was lost; checkpointing is no longer allowed.
    LeaseLost,
    /// The shard has been fully drained.
    ShardEnded,
    /// The orchestrator is shutting down.
    ShutdownRequested,
}

impl Action {
    /// Decodes an envelope into its typed action.
    ///
    /// # Errors
    ///
    /// Returns [`MultilangError::UnsupportedAction`] for tags outside the
    /// closed set and [`MultilangError::Parse`] for payloads that do not
    /// match their tag's shape.
    ///
    /// # Example
    ///
    /// ```
    /// use kcl_multilang::action::Action;
    /// use kcl_multilang::protocol::{ActionKind, Envelope};
    ///
    /// let envelope = Envelope::decode(r#"{"action":"shardEnded"}"#).expect("valid line");
    /// let action = Action::decode(&envelope).expect("known action");
    /// assert_eq!(action.kind(), ActionKind::ShardEnded);
    /// ```
    pub fn decode(envelope: &Envelope) -> Result<Self, MultilangError> {
        match envelope.kind()? {
            ActionKind::Initialize => InitAction::from_envelope(envelope).map(Self::Initialize),
            ActionKind::ProcessRecords => {
                ProcessRecordsAction::from_envelope(envelope).map(Self::ProcessRecords)
            }
            ActionKind::LeaseLost => Ok(Self::LeaseLost),
            ActionKind::ShardEnded => Ok(Self::ShardEnded),
            ActionKind::ShutdownRequested => Ok(Self::ShutdownRequested),
        }
    }

    /// Returns the kind of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Initialize(_) => ActionKind::Initialize,
            Self::ProcessRecords(_) => ActionKind::ProcessRecords,
            Self::LeaseLost => ActionKind::LeaseLost,
            Self::ShardEnded => ActionKind::ShardEnded,
            Self::ShutdownRequested => ActionKind::ShutdownRequested,
        }
    }
}

fn decode_payload<T: DeserializeOwned>(
    envelope: &Envelope,
    expected: ActionKind,
) -> Result<T, MultilangError> {
    if envelope.action() != expected.as_str() {
        return Err(MultilangError::unexpected_action(
            format!("'{expected}'"),
            envelope.action(),
        ));
    }
    envelope.payload_as()
}
