//! Mergeable content fields for tasks and comments.
//!
//! These types hold only the fields the conflict detector and auto-resolver
//! reason about. Identity, ownership, and timestamp columns live on the
//! server's row types, which wrap one of these alongside a `VectorClock`.

use serde::{Deserialize, Serialize};

/// The kind of entity a tombstone or conflict record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Comment,
    Attachment,
}

/// Task status. Ranked for auto-resolution: later stages win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// `todo(0) < in_progress(1) < blocked(2) < done(3) < cancelled(4)`.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Blocked => 2,
            TaskStatus::Done => 3,
            TaskStatus::Cancelled => 4,
        }
    }
}

/// Task priority. Ranked for auto-resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// `low(0) < medium(1) < high(2) < urgent(3)`.
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Medium => 1,
            TaskPriority::High => 2,
            TaskPriority::Urgent => 3,
        }
    }
}

/// The content fields of a task that participate in checksum computation,
/// conflict detection, and auto-resolution. Excludes identity, ownership,
/// version, vector clock, and timestamps, which are server row concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Milliseconds since epoch, UTC.
    pub due_date: Option<i64>,
    pub assigned_to: Option<String>,
    pub tags: Vec<String>,
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
    /// High-precision decimal rendered as a string to avoid float drift.
    pub position: String,
}

/// The content fields of a comment that participate in conflict detection
/// and auto-resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentFields {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rank_is_monotonic_in_declared_order() {
        assert!(TaskStatus::Todo.rank() < TaskStatus::InProgress.rank());
        assert!(TaskStatus::InProgress.rank() < TaskStatus::Blocked.rank());
        assert!(TaskStatus::Blocked.rank() < TaskStatus::Done.rank());
        assert!(TaskStatus::Done.rank() < TaskStatus::Cancelled.rank());
    }

    #[test]
    fn priority_rank_is_monotonic_in_declared_order() {
        assert!(TaskPriority::Low.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::High.rank());
        assert!(TaskPriority::High.rank() < TaskPriority::Urgent.rank());
    }

    #[test]
    fn task_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn entity_type_serializes_snake_case() {
        let json = serde_json::to_string(&EntityType::Attachment).unwrap();
        assert_eq!(json, "\"attachment\"");
    }
}
