//! Shared doubles for dispatch tests.

use std::io::{Cursor, Read};

use crate::action::{InitAction, ProcessRecordsAction, Record};
use crate::checkpoint::{CheckpointAck, Checkpointer};
use crate::config::DispatcherConfig;
use crate::dispatch::Dispatcher;
use crate::error::MultilangError;
use crate::processor::RecordProcessor;
use crate::protocol::ActionKind;

pub(crate) const INIT_LINE: &str =
    r#"{"action":"initialize","shardId":"shard-1","sequenceNumber":"100","subSequenceNumber":0}"#;
pub(crate) const RECORDS_LINE: &str = concat!(
    r#"{"action":"processRecords","millisBehindLatest":50,"records":["#,
    r#"{"data":"aGk=","partitionKey":"k1","approximateArrivalTimestamp":1000,"sequenceNumber":"101","subSequenceNumber":0}"#,
    r#"]}"#,
);
pub(crate) const ACK_LINE: &str =
    r#"{"action":"checkpoint","sequenceNumber":"101","subSequenceNumber":"0","error":""}"#;

/// A processor method invocation with the arguments it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Initialize(InitAction),
    ProcessRecords(ProcessRecordsAction),
    LeaseLost,
    ShardEnded,
    ShutdownRequested,
}

/// Records every call and optionally checkpoints or fails on request.
#[derive(Debug, Default)]
pub(crate) struct RecordingProcessor {
    pub(crate) calls: Vec<Call>,
    pub(crate) acks: Vec<CheckpointAck>,
    pub(crate) checkpoint_batches: bool,
    pub(crate) fail_on: Option<ActionKind>,
}

impl RecordingProcessor {
    pub(crate) fn checkpointing() -> Self {
        Self {
            checkpoint_batches: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_on(kind: ActionKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::default()
        }
    }

    fn record(&mut self, kind: ActionKind, call: Call) -> Result<(), MultilangError> {
        self.calls.push(call);
        if self.fail_on == Some(kind) {
            return Err(MultilangError::processor(format!("{kind} failed")));
        }
        Ok(())
    }
}

impl RecordProcessor for RecordingProcessor {
    fn initialize(&mut self, init: &InitAction) -> Result<(), MultilangError> {
        self.record(ActionKind::Initialize, Call::Initialize(init.clone()))
    }

    fn process_records(
        &mut self,
        batch: &ProcessRecordsAction,
        checkpointer: &mut dyn Checkpointer,
    ) -> Result<(), MultilangError> {
        self.record(ActionKind::ProcessRecords, Call::ProcessRecords(batch.clone()))?;

        let Some(last) = batch.last_record().filter(|_| self.checkpoint_batches) else {
            return Ok(());
        };
        let ack = checkpointer
            .checkpoint_at_sub_sequence(last.sequence_number(), last.sub_sequence_number())?;
        self.acks.push(ack);
        Ok(())
    }

    fn lease_lost(&mut self) -> Result<(), MultilangError> {
        self.record(ActionKind::LeaseLost, Call::LeaseLost)
    }

    fn shard_ended(&mut self, checkpointer: &mut dyn Checkpointer) -> Result<(), MultilangError> {
        self.record(ActionKind::ShardEnded, Call::ShardEnded)?;
        if self.checkpoint_batches {
            let ack = checkpointer.checkpoint_batch()?;
            self.acks.push(ack);
        }
        Ok(())
    }

    fn shutdown_requested(
        &mut self,
        _checkpointer: &mut dyn Checkpointer,
    ) -> Result<(), MultilangError> {
        self.record(ActionKind::ShutdownRequested, Call::ShutdownRequested)
    }
}

pub(crate) type TestDispatcher = Dispatcher<RecordingProcessor, Cursor<Vec<u8>>, Vec<u8>>;

/// Builds a dispatcher reading the given lines, each newline-terminated.
pub(crate) fn dispatcher(lines: &[&str], processor: RecordingProcessor) -> TestDispatcher {
    let mut input = String::new();
    for line in lines {
        input.push_str(line);
        input.push('\n');
    }
    Dispatcher::new(
        DispatcherConfig::new(Cursor::new(input.into_bytes()), Vec::new()),
        processor,
    )
}

/// Splits a dispatcher into its processor, unread input and written lines.
pub(crate) fn finish(dispatcher: TestDispatcher) -> (RecordingProcessor, String, Vec<String>) {
    let (processor, mut reader, output) = dispatcher.into_parts();
    let mut rest = String::new();
    reader.read_to_string(&mut rest).expect("read remaining input");
    let written = String::from_utf8(output)
        .expect("utf8 output")
        .lines()
        .map(str::to_owned)
        .collect();
    (processor, rest, written)
}

/// The action decoded from [`INIT_LINE`].
pub(crate) fn scenario_init() -> InitAction {
    InitAction::new("shard-1", "100", 0)
}

/// The action decoded from [`RECORDS_LINE`].
pub(crate) fn scenario_batch() -> ProcessRecordsAction {
    ProcessRecordsAction::new(vec![Record::new("aGk=", "k1", 1000, "101", 0)], 50)
}

/// Status line written after the given action completes.
pub(crate) fn status(kind: ActionKind) -> String {
    format!(r#"{{"action":"status","responseFor":"{kind}"}}"#)
}
