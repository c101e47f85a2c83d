//! Conflict detection and field-level auto-resolution.
//!
//! This is the only place a client-proposed change is weighed against
//! server state. Detection is a pure function of two vector clocks;
//! auto-resolution is a pure function of two content payloads.

use crate::clock::{ClockRelation, VectorClock};
use crate::record::{CommentFields, TaskFields};
use std::collections::BTreeSet;

/// What the caller should do with an incoming change, given the causal
/// relationship between its clock and the server row's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// Incoming is causally older than the server row; drop it silently.
    Reject,
    /// Clocks are equal; no-op (attribution may still be refreshed).
    NoOp,
    /// Incoming supersedes the server row; accept and overwrite.
    Accept,
    /// Neither clock dominates; run the auto-resolver.
    Concurrent,
}

/// Classify an incoming change against the server's current clock.
pub fn detect_conflict(incoming: &VectorClock, server: &VectorClock) -> ConflictOutcome {
    match incoming.compare(server) {
        ClockRelation::Before => ConflictOutcome::Reject,
        ClockRelation::Equal => ConflictOutcome::NoOp,
        ClockRelation::After => ConflictOutcome::Accept,
        ClockRelation::Concurrent => ConflictOutcome::Concurrent,
    }
}

/// The result of running the field-level merge policy.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMergeOutcome {
    /// Every field merged cleanly; carries the merged content.
    AutoResolved(TaskFields),
    /// At least one field could not be merged; names the offending fields,
    /// sorted, for the conflict reason message.
    Unresolvable(Vec<String>),
}

/// Apply the task field-merge policy to a concurrent pair of updates.
pub fn auto_resolve_task(incoming: &TaskFields, server: &TaskFields) -> TaskMergeOutcome {
    let mut unresolvable = BTreeSet::new();

    let title = if incoming.title == server.title {
        server.title.clone()
    } else {
        unresolvable.insert("title".to_string());
        server.title.clone()
    };

    let description = if incoming.description == server.description {
        server.description.clone()
    } else {
        unresolvable.insert("description".to_string());
        server.description.clone()
    };

    let assigned_to = if incoming.assigned_to == server.assigned_to {
        server.assigned_to.clone()
    } else {
        unresolvable.insert("assigned_to".to_string());
        server.assigned_to.clone()
    };

    let status = if incoming.status.rank() >= server.status.rank() {
        incoming.status
    } else {
        server.status
    };

    let priority = if incoming.priority.rank() >= server.priority.rank() {
        incoming.priority
    } else {
        server.priority
    };

    let due_date = merge_due_date(incoming.due_date, server.due_date);
    let tags = sorted_union(&incoming.tags, &server.tags);

    let (custom_fields, custom_fields_conflict) =
        merge_custom_fields(&incoming.custom_fields, &server.custom_fields);
    if custom_fields_conflict {
        unresolvable.insert("custom_fields".to_string());
    }

    if unresolvable.is_empty() {
        TaskMergeOutcome::AutoResolved(TaskFields {
            title,
            description,
            status,
            priority,
            due_date,
            assigned_to,
            tags,
            custom_fields,
            position: server.position.clone(),
        })
    } else {
        TaskMergeOutcome::Unresolvable(unresolvable.into_iter().collect())
    }
}

/// "Earlier (closer) non-null wins; null loses to any date."
fn merge_due_date(incoming: Option<i64>, server: Option<i64>) -> Option<i64> {
    match (incoming, server) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn sorted_union(a: &[String], b: &[String]) -> Vec<String> {
    let mut set: BTreeSet<String> = a.iter().cloned().collect();
    set.extend(b.iter().cloned());
    set.into_iter().collect()
}

/// Key-wise merge: equal values kept, disjoint keys unioned, per-key
/// disagreement makes the whole field unresolvable (but the merge still
/// proceeds so other fields can be evaluated independently).
fn merge_custom_fields(
    incoming: &serde_json::Map<String, serde_json::Value>,
    server: &serde_json::Map<String, serde_json::Value>,
) -> (serde_json::Map<String, serde_json::Value>, bool) {
    let mut merged = server.clone();
    let mut conflict = false;

    for (key, incoming_value) in incoming {
        match server.get(key) {
            None => {
                merged.insert(key.clone(), incoming_value.clone());
            }
            Some(server_value) if server_value == incoming_value => {}
            Some(_) => conflict = true,
        }
    }

    (merged, conflict)
}

/// The result of running the comment merge policy.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentMergeOutcome {
    AutoResolved(CommentFields),
    Unresolvable(Vec<String>),
}

/// Comments only carry `content`: equal content auto-resolves, anything
/// else needs a human.
pub fn auto_resolve_comment(incoming: &CommentFields, server: &CommentFields) -> CommentMergeOutcome {
    if incoming.content == server.content {
        CommentMergeOutcome::AutoResolved(server.clone())
    } else {
        CommentMergeOutcome::Unresolvable(vec!["content".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TaskPriority, TaskStatus};
    use serde_json::json;

    fn clock(pairs: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_counters(pairs.iter().map(|(k, v)| (k.to_string(), *v)))
    }

    fn task(title: &str, status: TaskStatus, priority: TaskPriority) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            description: Some("same".to_string()),
            status,
            priority,
            due_date: None,
            assigned_to: None,
            tags: vec![],
            custom_fields: Default::default(),
            position: "1000".to_string(),
        }
    }

    #[test]
    fn detect_conflict_before_rejects() {
        let incoming = clock(&[("a", 1)]);
        let server = clock(&[("a", 2)]);
        assert_eq!(detect_conflict(&incoming, &server), ConflictOutcome::Reject);
    }

    #[test]
    fn detect_conflict_equal_is_noop() {
        let c = clock(&[("a", 1)]);
        assert_eq!(detect_conflict(&c, &c), ConflictOutcome::NoOp);
    }

    #[test]
    fn detect_conflict_after_accepts() {
        let incoming = clock(&[("a", 2), ("b", 1)]);
        let server = clock(&[("a", 1)]);
        assert_eq!(detect_conflict(&incoming, &server), ConflictOutcome::Accept);
    }

    #[test]
    fn detect_conflict_concurrent() {
        let incoming = clock(&[("a", 2), ("b", 0)]);
        let server = clock(&[("a", 1), ("b", 1)]);
        assert_eq!(
            detect_conflict(&incoming, &server),
            ConflictOutcome::Concurrent
        );
    }

    #[test]
    fn auto_resolve_status_picks_higher_rank() {
        let incoming = task("T", TaskStatus::InProgress, TaskPriority::Medium);
        let server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => {
                assert_eq!(merged.status, TaskStatus::InProgress);
            }
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn auto_resolve_differing_title_is_unresolvable() {
        let incoming = task("Title A", TaskStatus::Todo, TaskPriority::Medium);
        let server = task("Title B", TaskStatus::Todo, TaskPriority::Medium);
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::Unresolvable(fields) => assert_eq!(fields, vec!["title".to_string()]),
            TaskMergeOutcome::AutoResolved(_) => panic!("expected unresolvable"),
        }
    }

    #[test]
    fn auto_resolve_due_date_prefers_earlier() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let mut server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.due_date = Some(2_000);
        server.due_date = Some(1_000);
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => assert_eq!(merged.due_date, Some(1_000)),
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn auto_resolve_due_date_null_loses_to_any_date() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.due_date = Some(5_000);
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => assert_eq!(merged.due_date, Some(5_000)),
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn auto_resolve_tags_union_and_sort() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let mut server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.tags = vec!["b".into(), "a".into()];
        server.tags = vec!["c".into(), "a".into()];
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => {
                assert_eq!(merged.tags, vec!["a", "b", "c"]);
            }
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn auto_resolve_custom_fields_disjoint_keys_union() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let mut server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.custom_fields.insert("estimate".into(), json!(3));
        server.custom_fields.insert("risk".into(), json!("low"));
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => {
                assert_eq!(merged.custom_fields.get("estimate"), Some(&json!(3)));
                assert_eq!(merged.custom_fields.get("risk"), Some(&json!("low")));
            }
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn auto_resolve_custom_fields_disagreement_is_unresolvable() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let mut server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.custom_fields.insert("estimate".into(), json!(3));
        server.custom_fields.insert("estimate".into(), json!(5));
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::Unresolvable(fields) => {
                assert_eq!(fields, vec!["custom_fields".to_string()]);
            }
            TaskMergeOutcome::AutoResolved(_) => panic!("expected unresolvable"),
        }
    }

    #[test]
    fn auto_resolve_position_always_server_wins() {
        let mut incoming = task("T", TaskStatus::Todo, TaskPriority::Medium);
        let server = task("T", TaskStatus::Todo, TaskPriority::Medium);
        incoming.position = "9999".to_string();
        match auto_resolve_task(&incoming, &server) {
            TaskMergeOutcome::AutoResolved(merged) => assert_eq!(merged.position, server.position),
            TaskMergeOutcome::Unresolvable(fields) => panic!("unexpected conflict: {fields:?}"),
        }
    }

    #[test]
    fn comment_equal_content_auto_resolves() {
        let incoming = CommentFields {
            content: "same".to_string(),
        };
        let server = incoming.clone();
        assert_eq!(
            auto_resolve_comment(&incoming, &server),
            CommentMergeOutcome::AutoResolved(server)
        );
    }

    #[test]
    fn comment_differing_content_is_unresolvable() {
        let incoming = CommentFields {
            content: "a".to_string(),
        };
        let server = CommentFields {
            content: "b".to_string(),
        };
        assert_eq!(
            auto_resolve_comment(&incoming, &server),
            CommentMergeOutcome::Unresolvable(vec!["content".to_string()])
        );
    }
}
