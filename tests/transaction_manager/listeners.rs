//! Completion listener delivery.

use crate::common::*;
use xatm::{Error, Status, TransactionError};

#[test]
fn listeners_see_commit_in_registration_order() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let first = RecordingListener::new();
    let second = RecordingListener::new();
    txn.register_listener(first.clone()).unwrap();
    txn.register_listener(second.clone()).unwrap();

    tm.commit(ctx).unwrap();

    for listener in [&first, &second] {
        assert_eq!(listener.before_calls(), 1);
        assert_eq!(listener.after_calls(), vec![Status::Committed]);
    }
}

#[test]
fn rollback_skips_before_completion() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let listener = RecordingListener::new();
    txn.register_listener(listener.clone()).unwrap();

    tm.rollback(ctx).unwrap();

    assert_eq!(listener.before_calls(), 0);
    assert_eq!(listener.after_calls(), vec![Status::RolledBack]);
}

#[test]
fn failed_prepare_still_notifies_after_completion() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    txn.enlist(
        RecordingParticipant::new("p1", &log)
            .failing_prepare(XA_RBROLLBACK)
            .build(),
    )
    .unwrap();
    let listener = RecordingListener::new();
    txn.register_listener(listener.clone()).unwrap();

    assert!(tm.commit(ctx).is_err());

    assert_eq!(listener.before_calls(), 1);
    assert_eq!(listener.after_calls(), vec![Status::RolledBack]);
}

#[test]
fn partial_outcome_still_notifies_after_completion() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    txn.enlist(
        RecordingParticipant::new("p1", &log)
            .failing_commit(XAER_RMFAIL)
            .build(),
    )
    .unwrap();
    let listener = RecordingListener::new();
    txn.register_listener(listener.clone()).unwrap();

    assert!(tm.commit(ctx).unwrap_err().is_possibly_inconsistent());
    assert_eq!(listener.after_calls(), vec![Status::Committed]);
}

#[test]
fn failing_listeners_do_not_abort_completion() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    txn.enlist(p1.clone()).unwrap();

    let failing = RecordingListener::with(BeforeAction::Fail, true);
    let healthy = RecordingListener::new();
    txn.register_listener(failing.clone()).unwrap();
    txn.register_listener(healthy.clone()).unwrap();

    tm.commit(ctx).unwrap();

    assert_eq!(p1.commits(), 1);
    assert_eq!(failing.after_calls(), vec![Status::Committed]);
    assert_eq!(healthy.before_calls(), 1);
    assert_eq!(healthy.after_calls(), vec![Status::Committed]);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

#[test]
fn listener_can_doom_transaction_before_completion() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    txn.enlist(p1.clone()).unwrap();

    let doomer = RecordingListener::with(BeforeAction::MarkRollbackOnly, false);
    doomer.attach(&txn);
    txn.register_listener(doomer.clone()).unwrap();

    let err = tm.commit(ctx).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::MarkedForRollback { .. })
    ));

    assert_eq!(p1.count(Call::Prepare), 0);
    assert_eq!(p1.commits(), 0);
    assert_eq!(p1.rollbacks(), 1);
    assert_eq!(txn.status(), Status::RolledBack);
    assert_eq!(doomer.after_calls(), vec![Status::RolledBack]);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

#[test]
fn enlisting_during_completion_is_rejected() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let late = RecordingListener::with(BeforeAction::EnlistLate, false);
    late.attach(&txn);
    txn.register_listener(late.clone()).unwrap();

    tm.commit(ctx).unwrap();

    match late.late_enlist_result() {
        Some(Err(TransactionError::IllegalState { status, .. })) => {
            assert_eq!(status, Status::Active)
        }
        other => panic!("expected illegal state, got {:?}", other),
    }
    assert_eq!(txn.participant_count(), 0);
    assert_eq!(txn.status(), Status::Committed);
}

#[test]
fn registering_a_listener_twice_notifies_it_once() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let listener = RecordingListener::new();
    txn.register_listener(listener.clone()).unwrap();
    let registered = txn.listener_count();

    txn.register_listener(listener.clone()).unwrap();
    assert_eq!(txn.listener_count(), registered);

    tm.commit(ctx).unwrap();

    assert_eq!(listener.before_calls(), 1);
    assert_eq!(listener.after_calls(), vec![Status::Committed]);
}
