//! Database module for PostgreSQL persistence.

pub mod comments;
pub mod conflicts;
pub mod devices;
pub mod organizations;
pub mod pool;
pub mod sync_logs;
pub mod task_history;
pub mod tasks;
pub mod tombstones;
pub mod users;

pub use pool::*;

/// Shared string rendering for `sync_engine::record::EntityType`, since the
/// engine stays IO-free and does not know about SQL text columns.
pub fn entity_type_str(entity_type: sync_engine::record::EntityType) -> &'static str {
    match entity_type {
        sync_engine::record::EntityType::Task => "task",
        sync_engine::record::EntityType::Comment => "comment",
        sync_engine::record::EntityType::Attachment => "attachment",
    }
}
