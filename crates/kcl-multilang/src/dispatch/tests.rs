//! Unit tests for the dispatch loop.

use std::io::Cursor;

use rstest::rstest;

use super::*;
use crate::action::{ProcessRecordsAction, Record};
use crate::tests::support::{
    ACK_LINE, Call, INIT_LINE, RECORDS_LINE, RecordingProcessor, dispatcher, finish,
    scenario_batch, scenario_init, status,
};

const LEASE_LOST_LINE: &str = r#"{"action":"leaseLost"}"#;
const SHARD_ENDED_LINE: &str = r#"{"action":"shardEnded"}"#;
const SHUTDOWN_LINE: &str = r#"{"action":"shutdownRequested"}"#;

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn scenario_acknowledges_each_action_around_checkpoint() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, RECORDS_LINE, ACK_LINE],
        RecordingProcessor::checkpointing(),
    );

    assert_eq!(dispatcher.step().expect("initialize"), DispatchState::Running);
    assert_eq!(dispatcher.step().expect("records"), DispatchState::Running);

    let (processor, rest, written) = finish(dispatcher);
    assert!(rest.is_empty(), "the acknowledgement should be consumed");
    assert_eq!(
        written,
        vec![
            status(ActionKind::Initialize),
            String::from(r#"{"action":"checkpoint","sequenceNumber":"101","subSequenceNumber":0}"#),
            status(ActionKind::ProcessRecords),
        ]
    );
    assert_eq!(
        processor.calls,
        vec![
            Call::Initialize(scenario_init()),
            Call::ProcessRecords(scenario_batch()),
        ]
    );
    let ack = processor.acks.first().expect("one checkpoint recorded");
    assert_eq!(ack.sequence_number(), Some("101"));
    assert_eq!(ack.sub_sequence_number(), Some(0));
}

#[test]
fn every_action_reaches_its_method_once() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, RECORDS_LINE, SHUTDOWN_LINE, SHARD_ENDED_LINE],
        RecordingProcessor::default(),
    );

    let reason = dispatcher.run().expect("session completes");
    assert_eq!(reason, Termination::ShardEnded);

    let (processor, _, written) = finish(dispatcher);
    assert_eq!(
        processor.calls,
        vec![
            Call::Initialize(scenario_init()),
            Call::ProcessRecords(scenario_batch()),
            Call::ShutdownRequested,
            Call::ShardEnded,
        ]
    );
    assert_eq!(
        written,
        vec![
            status(ActionKind::Initialize),
            status(ActionKind::ProcessRecords),
            status(ActionKind::ShutdownRequested),
            status(ActionKind::ShardEnded),
        ]
    );
}

#[test]
fn records_keep_delivery_order() {
    let batch = concat!(
        r#"{"action":"processRecords","millisBehindLatest":0,"records":["#,
        r#"{"data":"","partitionKey":"c","approximateArrivalTimestamp":1,"sequenceNumber":"1","subSequenceNumber":0},"#,
        r#"{"data":"","partitionKey":"a","approximateArrivalTimestamp":2,"sequenceNumber":"2","subSequenceNumber":0},"#,
        r#"{"data":"","partitionKey":"b","approximateArrivalTimestamp":3,"sequenceNumber":"3","subSequenceNumber":0}"#,
        r#"]}"#,
    );
    let mut dispatcher = dispatcher(&[INIT_LINE, batch], RecordingProcessor::default());
    dispatcher.step().expect("initialize");
    dispatcher.step().expect("records");

    let expected = ProcessRecordsAction::new(
        vec![
            Record::new("", "c", 1, "1", 0),
            Record::new("", "a", 2, "2", 0),
            Record::new("", "b", 3, "3", 0),
        ],
        0,
    );
    assert_eq!(
        dispatcher.processor().calls.last(),
        Some(&Call::ProcessRecords(expected))
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[rstest]
#[case::lease_lost(LEASE_LOST_LINE, Termination::LeaseLost, Call::LeaseLost)]
#[case::shard_ended(SHARD_ENDED_LINE, Termination::ShardEnded, Call::ShardEnded)]
fn terminal_action_stops_reading(
    #[case] line: &str,
    #[case] expected: Termination,
    #[case] terminal_call: Call,
) {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, line, RECORDS_LINE],
        RecordingProcessor::default(),
    );

    assert_eq!(dispatcher.run().expect("session completes"), expected);
    assert_eq!(dispatcher.state(), DispatchState::Terminated(expected));
    assert_eq!(
        dispatcher.step().expect("terminated step is a no-op"),
        DispatchState::Terminated(expected)
    );

    let (processor, rest, _) = finish(dispatcher);
    assert_eq!(
        processor.calls,
        vec![Call::Initialize(scenario_init()), terminal_call]
    );
    assert_eq!(rest, format!("{RECORDS_LINE}\n"));
}

#[test]
fn shutdown_requested_keeps_running() {
    let mut dispatcher = dispatcher(&[INIT_LINE, SHUTDOWN_LINE], RecordingProcessor::default());
    dispatcher.step().expect("initialize");

    let state = dispatcher.step().expect("shutdown requested");
    assert_eq!(state, DispatchState::Running);
    assert!(!state.is_terminated());
}

#[test]
fn closed_input_between_actions_ends_the_loop() {
    let mut dispatcher = dispatcher(&[INIT_LINE, RECORDS_LINE], RecordingProcessor::default());

    let reason = dispatcher.run().expect("closed input is not an error");
    assert_eq!(reason, Termination::InputClosed);
    assert_eq!(dispatcher.processor().calls.len(), 2);
}

#[test]
fn new_dispatcher_awaits_init() {
    let dispatcher = dispatcher(&[], RecordingProcessor::default());
    assert_eq!(dispatcher.state(), DispatchState::AwaitingInit);
}

// ---------------------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------------------

#[rstest]
#[case::records_first(RECORDS_LINE, "UnexpectedAction")]
#[case::lease_lost_first(LEASE_LOST_LINE, "UnexpectedAction")]
#[case::unknown_first(r#"{"action":"bogus"}"#, "UnsupportedAction")]
#[case::garbage_first("not json", "Parse")]
#[case::blank_first("", "Parse")]
fn first_action_must_be_initialize(#[case] line: &str, #[case] variant: &str) {
    let mut dispatcher = dispatcher(&[line], RecordingProcessor::default());

    let err = dispatcher.step().expect_err("first action should be rejected");
    let matched = match variant {
        "UnexpectedAction" => matches!(err, MultilangError::UnexpectedAction { .. }),
        "UnsupportedAction" => matches!(err, MultilangError::UnsupportedAction { .. }),
        _ => matches!(err, MultilangError::Parse { .. }),
    };
    assert!(matched, "expected {variant}, got: {err}");
    assert_eq!(dispatcher.state(), DispatchState::AwaitingInit);

    let (processor, _, written) = finish(dispatcher);
    assert!(processor.calls.is_empty());
    assert!(written.is_empty());
}

#[test]
fn closed_input_before_init_is_transport_error() {
    let mut dispatcher = dispatcher(&[], RecordingProcessor::default());
    let err = dispatcher.run().expect_err("missing init should fail");
    assert!(matches!(err, MultilangError::Transport { .. }));
}

#[test]
fn unsupported_action_invokes_nothing() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, r#"{"action":"shutdown","reason":"TERMINATE"}"#],
        RecordingProcessor::default(),
    );
    dispatcher.step().expect("initialize");

    let err = dispatcher.step().expect_err("shutdown is not supported");
    assert!(
        matches!(&err, MultilangError::UnsupportedAction { action } if action == "shutdown"),
        "expected UnsupportedAction, got: {err}"
    );

    let (processor, _, written) = finish(dispatcher);
    assert_eq!(processor.calls.len(), 1);
    assert_eq!(written, vec![status(ActionKind::Initialize)]);
}

#[test]
fn second_initialize_is_rejected() {
    let mut dispatcher = dispatcher(&[INIT_LINE, INIT_LINE], RecordingProcessor::default());
    dispatcher.step().expect("initialize");

    let err = dispatcher.step().expect_err("second initialize should fail");
    assert!(
        matches!(&err, MultilangError::UnexpectedAction { found, .. } if found == "initialize"),
        "expected UnexpectedAction, got: {err}"
    );
    assert_eq!(dispatcher.processor().calls.len(), 1);
}

#[test]
fn invalid_utf8_line_is_parse_error() {
    let mut input = format!("{INIT_LINE}\n").into_bytes();
    input.extend_from_slice(b"{\"action\":\"leaseLost\",\"x\":\"\xff\"}\n");
    let config = DispatcherConfig::new(Cursor::new(input), Vec::<u8>::new());
    let mut dispatcher = Dispatcher::new(config, RecordingProcessor::default());
    dispatcher.step().expect("initialize");

    let err = dispatcher.step().expect_err("invalid UTF-8 should fail");
    assert!(
        matches!(err, MultilangError::Parse { .. }),
        "expected Parse error, got: {err}"
    );
    assert_eq!(dispatcher.processor().calls.len(), 1);
}

#[test]
fn malformed_batch_is_parse_error() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, r#"{"action":"processRecords","millisBehindLatest":5}"#],
        RecordingProcessor::default(),
    );
    dispatcher.step().expect("initialize");

    let err = dispatcher.step().expect_err("missing records should fail");
    assert!(matches!(err, MultilangError::Parse { .. }));
    assert_eq!(dispatcher.processor().calls.len(), 1);
}

// ---------------------------------------------------------------------------
// Failures inside an action
// ---------------------------------------------------------------------------

#[test]
fn rejected_checkpoint_surfaces_without_status() {
    let rejection = r#"{"action":"checkpoint","error":"LeaseNotOwned"}"#;
    let mut dispatcher = dispatcher(
        &[INIT_LINE, RECORDS_LINE, rejection, LEASE_LOST_LINE],
        RecordingProcessor::checkpointing(),
    );

    let err = dispatcher.run().expect_err("rejection should abort the loop");
    assert_eq!(err.rejection_reason(), Some("LeaseNotOwned"));

    let (_, rest, written) = finish(dispatcher);
    assert_eq!(rest, format!("{LEASE_LOST_LINE}\n"));
    assert_eq!(
        written,
        vec![
            status(ActionKind::Initialize),
            String::from(r#"{"action":"checkpoint","sequenceNumber":"101","subSequenceNumber":0}"#),
        ]
    );
}

#[test]
fn action_in_place_of_ack_is_a_desync() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, RECORDS_LINE, LEASE_LOST_LINE],
        RecordingProcessor::checkpointing(),
    );

    let err = dispatcher.run().expect_err("missing ack should abort the loop");
    assert!(
        matches!(&err, MultilangError::UnexpectedAction { found, .. } if found == "leaseLost"),
        "expected UnexpectedAction, got: {err}"
    );
}

#[rstest]
#[case::initialize(ActionKind::Initialize, 0)]
#[case::process_records(ActionKind::ProcessRecords, 1)]
#[case::shutdown_requested(ActionKind::ShutdownRequested, 2)]
fn processor_failure_suppresses_status(#[case] kind: ActionKind, #[case] acknowledged: usize) {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, RECORDS_LINE, SHUTDOWN_LINE, LEASE_LOST_LINE],
        RecordingProcessor::failing_on(kind),
    );

    let err = dispatcher.run().expect_err("processor failure should abort");
    assert!(
        matches!(err, MultilangError::Processor { .. }),
        "expected Processor error, got: {err}"
    );

    let (_, _, written) = finish(dispatcher);
    assert_eq!(written.len(), acknowledged);
    assert!(!written.contains(&status(kind)));
}

#[test]
fn shard_end_checkpoint_precedes_status() {
    let mut dispatcher = dispatcher(
        &[INIT_LINE, SHARD_ENDED_LINE, r#"{"action":"checkpoint"}"#],
        RecordingProcessor::checkpointing(),
    );

    assert_eq!(dispatcher.run().expect("session completes"), Termination::ShardEnded);

    let (processor, rest, written) = finish(dispatcher);
    assert!(rest.is_empty());
    assert_eq!(processor.acks.len(), 1);
    assert_eq!(
        written,
        vec![
            status(ActionKind::Initialize),
            String::from(r#"{"action":"checkpoint"}"#),
            status(ActionKind::ShardEnded),
        ]
    );
}

#[test]
fn termination_describes_itself() {
    assert_eq!(Termination::InputClosed.to_string(), "input closed");
    assert_eq!(Termination::after(ActionKind::LeaseLost), Some(Termination::LeaseLost));
    assert_eq!(Termination::after(ActionKind::ShutdownRequested), None);
}
