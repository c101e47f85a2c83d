//! Canonical content checksums.
//!
//! A SHA-256 over a canonical JSON projection of a task's content fields,
//! used for change detection by clients that have lost local state.

use crate::record::TaskFields;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Compute the canonical checksum of a task's content fields.
///
/// `serde_json::Map` is `BTreeMap`-backed unless the `preserve_order`
/// feature is enabled, so nested objects in `content` already serialize
/// with sorted keys; tags are sorted explicitly since they're a `Vec`.
pub fn task_checksum(fields: &TaskFields) -> String {
    let mut tags = fields.tags.clone();
    tags.sort();

    let due_date = fields.due_date.and_then(|ms| {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    });

    let content = json!({
        "title": fields.title,
        "description": fields.description.clone().unwrap_or_default(),
        "status": fields.status,
        "priority": fields.priority,
        "due_date": due_date,
        "assigned_to": fields.assigned_to,
        "tags": tags,
        "custom_fields": fields.custom_fields,
    });

    let canonical = serde_json::to_string(&content).expect("json value always serializes");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TaskPriority, TaskStatus};

    fn sample() -> TaskFields {
        TaskFields {
            title: "Write the proposal".into(),
            description: Some("first draft".into()),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            assigned_to: None,
            tags: vec!["b".into(), "a".into()],
            custom_fields: Default::default(),
            position: "1000".into(),
        }
    }

    #[test]
    fn stable_across_tag_order() {
        let mut a = sample();
        let mut b = sample();
        a.tags = vec!["x".into(), "y".into()];
        b.tags = vec!["y".into(), "x".into()];
        assert_eq!(task_checksum(&a), task_checksum(&b));
    }

    #[test]
    fn changes_when_title_changes() {
        let a = sample();
        let mut b = sample();
        b.title = "Different title".into();
        assert_ne!(task_checksum(&a), task_checksum(&b));
    }

    #[test]
    fn ignores_position() {
        let a = sample();
        let mut b = sample();
        b.position = "2000.5".into();
        assert_eq!(task_checksum(&a), task_checksum(&b));
    }

    #[test]
    fn is_deterministic() {
        let a = sample();
        assert_eq!(task_checksum(&a), task_checksum(&a));
    }

    #[test]
    fn is_64_lowercase_hex_chars() {
        let sum = task_checksum(&sample());
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
