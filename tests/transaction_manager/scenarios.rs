//! Two-phase commit scenarios.

use crate::common::*;
use std::sync::Arc;
use xatm::{CompletionPhase, EndFlag, Error, Status, TransactionError, Vote};

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn single_participant_commits_through_every_phase() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    p1.watch(&txn);

    txn.enlist(p1.clone()).unwrap();
    tm.commit(ctx).unwrap();

    assert_eq!(
        p1.calls(),
        vec![
            Call::SetTimeout(30),
            Call::Start,
            Call::End(EndFlag::Success),
            Call::Prepare,
            Call::Commit { one_phase: false },
        ]
    );
    assert_eq!(
        txn.history(),
        vec![
            Status::Active,
            Status::Preparing,
            Status::Prepared,
            Status::Committing,
            Status::Committed,
        ]
    );

    let observed = p1.observed();
    assert!(observed.contains(&(Call::Prepare, Status::Preparing)));
    assert!(observed.contains(&(Call::Commit { one_phase: false }, Status::Committing)));

    assert_eq!(txn.status(), Status::Committed);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

#[test]
fn participants_are_driven_in_enlistment_order() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    let p2 = RecordingParticipant::new("p2", &log).build();
    let p3 = RecordingParticipant::new("p3", &log).build();

    txn.enlist(p2.clone()).unwrap();
    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p3.clone()).unwrap();
    log.lock().clear();

    tm.commit(ctx).unwrap();

    let order: Vec<_> = log
        .lock()
        .iter()
        .filter(|(_, call)| matches!(call, Call::Prepare | Call::Commit { .. }))
        .map(|(name, call)| (*name, *call))
        .collect();
    assert_eq!(
        order,
        vec![
            ("p2", Call::Prepare),
            ("p1", Call::Prepare),
            ("p3", Call::Prepare),
            ("p2", Call::Commit { one_phase: false }),
            ("p1", Call::Commit { one_phase: false }),
            ("p3", Call::Commit { one_phase: false }),
        ]
    );
}

// ============================================================================
// Prepare failures
// ============================================================================

#[test]
fn rollback_class_prepare_error_rolls_back_prepared_participants() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    let p2 = RecordingParticipant::new("p2", &log)
        .failing_prepare(XA_RBROLLBACK)
        .build();

    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();

    let err = tm.commit(ctx).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::PrepareFailed { .. })
    ));
    assert!(err.is_rollback());

    assert_eq!(p1.rollbacks(), 1);
    assert_eq!(p1.count(Call::End(EndFlag::Fail)), 1);
    assert_eq!(p1.commits(), 0);
    assert_eq!(p2.commits(), 0);
    assert_eq!(p2.rollbacks(), 0);

    assert_eq!(txn.status(), Status::RolledBack);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

#[test]
fn non_rollback_prepare_error_still_rolls_back_failed_participant() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    let p2 = RecordingParticipant::new("p2", &log)
        .failing_prepare(XAER_RMERR)
        .build();
    let p3 = RecordingParticipant::new("p3", &log)
        .voting(Vote::ReadOnly)
        .build();

    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();
    txn.enlist(p3.clone()).unwrap();

    assert!(tm.commit(ctx).unwrap_err().is_rollback());

    assert_eq!(p1.rollbacks(), 1);
    assert_eq!(p2.rollbacks(), 1);
    assert_eq!(p3.rollbacks(), 0, "read-only participant is already complete");
    assert_eq!(txn.participant_count(), 2);
    assert_eq!(txn.status(), Status::RolledBack);
}

#[test]
fn prepare_continues_past_a_failed_participant() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log)
        .failing_prepare(XA_RBTIMEOUT)
        .build();
    let p2 = RecordingParticipant::new("p2", &log).build();

    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();

    assert!(tm.commit(ctx).is_err());
    assert_eq!(p2.count(Call::Prepare), 1);
    assert_eq!(p2.rollbacks(), 1);
}

// ============================================================================
// Enlistment and binding
// ============================================================================

#[test]
fn enlisting_same_participant_twice_fails() {
    let tm = manager();
    let (_ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();

    txn.enlist(p1.clone()).unwrap();
    let err = txn.enlist(p1.clone()).unwrap_err();

    assert!(matches!(err, TransactionError::AlreadyEnlisted));
    assert!(err.is_illegal_state());
    assert_eq!(txn.participant_count(), 1);
    assert_eq!(p1.count(Call::Start), 1);
}

#[test]
fn nested_begin_fails_and_keeps_first_transaction() {
    let tm = manager();
    let (ctx, first) = begin(&tm);
    let log = call_log();
    first
        .enlist(RecordingParticipant::new("p1", &log).build())
        .unwrap();

    let err = tm.begin(ctx).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::NestedNotSupported { .. })
    ));
    assert!(err.is_not_supported());

    let current = tm.transaction(ctx).unwrap();
    assert!(Arc::ptr_eq(&current, &first));
    assert_eq!(current.status(), Status::Active);
    assert_eq!(current.participant_count(), 1);
}

// ============================================================================
// Partial outcomes
// ============================================================================

#[test]
fn commit_failure_after_prepare_reports_partial_outcome() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    let p2 = RecordingParticipant::new("p2", &log)
        .failing_commit(XAER_RMFAIL)
        .build();

    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();

    let err = tm.commit(ctx).unwrap_err();
    match &err {
        Error::Transaction(TransactionError::PartialOutcome {
            phase,
            failed,
            attempted,
            ..
        }) => {
            assert_eq!(*phase, CompletionPhase::Commit);
            assert_eq!(*failed, 1);
            assert_eq!(*attempted, 2);
        }
        other => panic!("expected partial outcome, got {:?}", other),
    }
    assert!(err.is_possibly_inconsistent());
    assert!(err.is_system_failure());

    assert_eq!(p1.commits(), 1);
    assert_eq!(p2.commits(), 1);
    assert_eq!(txn.status(), Status::Committed);
    assert!(txn.is_possibly_inconsistent());
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

#[test]
fn every_participant_gets_a_commit_attempt() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log)
        .failing_commit(XAER_RMERR)
        .build();
    let p2 = RecordingParticipant::new("p2", &log)
        .failing_commit(XAER_RMFAIL)
        .build();
    let p3 = RecordingParticipant::new("p3", &log).build();

    for p in [&p1, &p2, &p3] {
        txn.enlist(p.clone()).unwrap();
    }

    let err = tm.commit(ctx).unwrap_err();
    assert!(err.is_possibly_inconsistent());
    assert_eq!(p1.commits(), 1);
    assert_eq!(p2.commits(), 1);
    assert_eq!(p3.commits(), 1);
    assert_eq!(txn.status(), Status::Committed);
}

#[test]
fn rollback_failure_reports_partial_outcome() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log)
        .failing_rollback(XAER_RMFAIL)
        .build();
    let p2 = RecordingParticipant::new("p2", &log).build();

    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();

    let err = tm.rollback(ctx).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::PartialOutcome {
            phase: CompletionPhase::Rollback,
            ..
        })
    ));
    assert_eq!(p2.rollbacks(), 1);
    assert_eq!(txn.status(), Status::RolledBack);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn rollback_from_active_ends_and_rolls_back_every_participant() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    let p2 = RecordingParticipant::new("p2", &log).build();
    txn.enlist(p1.clone()).unwrap();
    txn.enlist(p2.clone()).unwrap();

    tm.rollback(ctx).unwrap();

    for p in [&p1, &p2] {
        assert_eq!(
            p.calls()[2..],
            [Call::End(EndFlag::Fail), Call::Rollback],
            "rollback pass must end then roll back"
        );
        assert_eq!(p.count(Call::Prepare), 0);
    }
    assert_eq!(
        txn.history(),
        vec![Status::Active, Status::RollingBack, Status::RolledBack]
    );
}

#[test]
fn marked_transaction_rolls_back_through_facade() {
    let tm = manager();
    let (ctx, txn) = begin(&tm);
    let log = call_log();
    let p1 = RecordingParticipant::new("p1", &log).build();
    txn.enlist(p1.clone()).unwrap();

    tm.set_rollback_only(ctx).unwrap();
    assert_eq!(tm.status(ctx), Status::MarkedRollback);

    let err = tm.commit(ctx).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::MarkedForRollback { .. })
    ));
    assert_eq!(tm.status(ctx), Status::MarkedRollback);

    tm.rollback(ctx).unwrap();
    assert_eq!(p1.rollbacks(), 1);
    assert_eq!(txn.status(), Status::RolledBack);
    assert_eq!(tm.status(ctx), Status::NoTransaction);
}
