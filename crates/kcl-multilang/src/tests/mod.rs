//! Crate-level behaviour tests and shared test doubles.

use crate::action::Action;
use crate::protocol::Envelope;

pub(crate) mod support;

#[test]
fn scenario_lines_decode_to_their_actions() {
    let init = Action::decode(&Envelope::decode(support::INIT_LINE).expect("init envelope"))
        .expect("init action");
    assert_eq!(init, Action::Initialize(support::scenario_init()));

    let envelope = Envelope::decode(support::RECORDS_LINE).expect("records envelope");
    let records = Action::decode(&envelope).expect("records action");
    assert_eq!(records, Action::ProcessRecords(support::scenario_batch()));
}
