//! Scenario tests for the push protocol's conflict decision sequence:
//! `detect_conflict` followed by the relevant auto-resolver, exactly as
//! the push handler composes them for one incoming change.

use sync_engine::record::{CommentFields, TaskFields, TaskPriority, TaskStatus};
use sync_engine::{
    auto_resolve_comment, auto_resolve_task, detect_conflict, CommentMergeOutcome, ConflictOutcome,
    TaskMergeOutcome, VectorClock,
};

fn clock(pairs: &[(&str, u64)]) -> VectorClock {
    VectorClock::from_counters(pairs.iter().map(|(k, v)| (k.to_string(), *v)))
}

fn task(title: &str) -> TaskFields {
    TaskFields {
        title: title.to_string(),
        description: None,
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        due_date: None,
        assigned_to: None,
        tags: vec![],
        custom_fields: Default::default(),
        position: "1000".to_string(),
    }
}

/// Client pushes a change whose clock exactly matches the server row's: the
/// handler touches attribution and counts it processed, nothing else moves.
#[test]
fn equal_clocks_are_a_noop() {
    let server_clock = clock(&[("device-a", 3), ("device-b", 1)]);
    let incoming_clock = server_clock.clone();

    assert_eq!(
        detect_conflict(&incoming_clock, &server_clock),
        ConflictOutcome::NoOp
    );
}

/// Client pushes a change whose clock is strictly behind the server's: the
/// handler drops it silently, no row touched, no conflict raised.
#[test]
fn client_behind_server_is_silently_dropped() {
    let server_clock = clock(&[("device-a", 5)]);
    let incoming_clock = clock(&[("device-a", 3)]);

    assert_eq!(
        detect_conflict(&incoming_clock, &server_clock),
        ConflictOutcome::Reject
    );
}

/// Concurrent edits that touch disjoint fields merge cleanly: no human
/// ever sees this one.
#[test]
fn concurrent_edit_on_disjoint_fields_auto_resolves() {
    let server_clock = clock(&[("device-a", 1), ("device-b", 0)]);
    let incoming_clock = clock(&[("device-a", 0), ("device-b", 1)]);
    assert_eq!(
        detect_conflict(&incoming_clock, &server_clock),
        ConflictOutcome::Concurrent
    );

    let mut incoming = task("Ship the release");
    incoming.priority = TaskPriority::Urgent;
    let mut server = task("Ship the release");
    server.status = TaskStatus::InProgress;

    match auto_resolve_task(&incoming, &server) {
        TaskMergeOutcome::AutoResolved(merged) => {
            assert_eq!(merged.priority, TaskPriority::Urgent);
            assert_eq!(merged.status, TaskStatus::InProgress);
        }
        TaskMergeOutcome::Unresolvable(fields) => panic!("expected a clean merge, got {fields:?}"),
    }
}

/// Concurrent edits to the same free-text field (title) can't be merged
/// automatically and must surface as a conflict row.
#[test]
fn concurrent_edit_on_title_is_unresolvable() {
    let server_clock = clock(&[("device-a", 1), ("device-b", 0)]);
    let incoming_clock = clock(&[("device-a", 0), ("device-b", 1)]);
    assert_eq!(
        detect_conflict(&incoming_clock, &server_clock),
        ConflictOutcome::Concurrent
    );

    let incoming = task("Ship the launch");
    let server = task("Ship the release");

    match auto_resolve_task(&incoming, &server) {
        TaskMergeOutcome::Unresolvable(fields) => assert_eq!(fields, vec!["title".to_string()]),
        TaskMergeOutcome::AutoResolved(merged) => {
            panic!("expected an unresolvable title conflict, merged into {merged:?}")
        }
    }
}

/// Concurrent edits to the same comment content are equally unresolvable.
#[test]
fn concurrent_edit_on_comment_content_is_unresolvable() {
    let incoming = CommentFields {
        content: "first draft".to_string(),
    };
    let server = CommentFields {
        content: "second draft".to_string(),
    };

    match auto_resolve_comment(&incoming, &server) {
        CommentMergeOutcome::Unresolvable(fields) => assert_eq!(fields, vec!["content".to_string()]),
        CommentMergeOutcome::AutoResolved(_) => panic!("expected an unresolvable comment conflict"),
    }
}

/// A client pushing an update that outright supersedes the server's clock
/// (no concurrency) is simply accepted and overwrites.
#[test]
fn strictly_newer_clock_is_accepted_without_merging() {
    let server_clock = clock(&[("device-a", 1)]);
    let incoming_clock = clock(&[("device-a", 2), ("device-b", 1)]);

    assert_eq!(
        detect_conflict(&incoming_clock, &server_clock),
        ConflictOutcome::Accept
    );
}
