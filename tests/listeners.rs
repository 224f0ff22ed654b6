//! Listener delivery: per-session queues, unsubscription, and overflow
//! reporting.

mod common;

use common::*;
use lockstep::{
    EventKind, ListenerConfig, MapCommand, MapStateMachine, QueuedEvent, SessionId,
};

#[test]
fn each_session_gets_its_own_queue() {
    let mut machine = MapStateMachine::new();
    let alice = SessionId::new(1);
    let bob = SessionId::new(2);

    machine
        .apply_command(&ctx_from(1, 1, alice), MapCommand::AddListener)
        .unwrap();
    machine
        .apply_command(&ctx_from(2, 2, bob), MapCommand::AddListener)
        .unwrap();
    apply_update(&mut machine, &ctx(3, 3), put("k", &[1]));

    assert_eq!(machine.poll_events(alice).len(), 1);
    // Draining alice's queue leaves bob's untouched
    assert_eq!(machine.poll_events(bob).len(), 1);
    assert!(machine.poll_events(alice).is_empty());
}

#[test]
fn remove_listener_stops_delivery() {
    let mut machine = MapStateMachine::new();
    let session = SessionId::new(1);

    machine
        .apply_command(&ctx_from(1, 1, session), MapCommand::AddListener)
        .unwrap();
    apply_update(&mut machine, &ctx(2, 2), put("k", &[1]));
    machine
        .apply_command(&ctx_from(3, 3, session), MapCommand::RemoveListener)
        .unwrap();
    apply_update(&mut machine, &ctx(4, 4), put("k", &[2]));

    // Unsubscribing dropped the queue, pending events included
    assert!(machine.poll_events(session).is_empty());
}

#[test]
fn overflow_is_reported_as_a_leading_lagged_marker() {
    let mut machine = MapStateMachine::with_config(ListenerConfig::for_testing());
    let session = SessionId::new(1);
    machine
        .apply_command(&ctx_from(1, 1, session), MapCommand::AddListener)
        .unwrap();

    // Capacity is 4; publish 9 events, dropping the first 5
    for n in 0..9u64 {
        apply_update(&mut machine, &ctx(2 + n, 2 + n), put("k", &[n as u8]));
    }

    let drained = machine.poll_events(session);
    assert_eq!(drained[0], QueuedEvent::Lagged { missed: 5 });
    assert_eq!(drained.len(), 5);
    match &drained[4] {
        QueuedEvent::Event(event) => {
            assert_eq!(event.kind, EventKind::Updated);
            assert_eq!(event.new.as_ref().unwrap().value, vec![8]);
        }
        other => panic!("unexpected queued element {:?}", other),
    }

    // The loss was reported once; delivery continues normally
    apply_update(&mut machine, &ctx(11, 11), put("k", &[99]));
    let drained = machine.poll_events(session);
    assert_eq!(drained.len(), 1);
    assert!(matches!(drained[0], QueuedEvent::Event(_)));
}
