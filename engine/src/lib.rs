//! # sync-engine
//!
//! The deterministic, IO-free core of a multi-device task-sync server:
//! vector-clock algebra, conflict detection, and field-level auto-resolution.
//!
//! ## Design principles
//!
//! - **No IO**: the engine has no knowledge of databases, files, or the
//!   network. It is a pure function library.
//! - **Deterministic**: the same two inputs always produce the same
//!   resolution, independent of arrival order.
//! - **Testable**: pure logic, no mocks, no database needed to exercise it.
//!
//! ## Core concepts
//!
//! ### Vector clocks
//!
//! A [`clock::VectorClock`] maps device identifier to a monotonic counter.
//! [`clock::VectorClock::compare`] is the only place causality is reasoned
//! about; [`clock::VectorClock::merge`] and
//! [`clock::VectorClock::increment`] are its two constructors for combining
//! or advancing clocks.
//!
//! ### Conflict detection and auto-resolution
//!
//! [`conflict::detect_conflict`] classifies an incoming change against a
//! server clock into [`conflict::ConflictOutcome`]. When the outcome is
//! `Concurrent`, [`conflict::auto_resolve_task`] and
//! [`conflict::auto_resolve_comment`] apply the field-level merge policy,
//! producing either a merged payload or the set of fields that need a human.
//!
//! ### Checksums
//!
//! [`checksum::task_checksum`] computes the canonical SHA-256 content hash
//! used for client-side change detection.
//!
//! ## Quick start
//!
//! ```rust
//! use sync_engine::clock::VectorClock;
//! use sync_engine::conflict::{detect_conflict, ConflictOutcome};
//!
//! let server_clock = VectorClock::origin("device-a");
//! let incoming_clock = server_clock.increment("device-a");
//!
//! assert_eq!(detect_conflict(&incoming_clock, &server_clock), ConflictOutcome::Accept);
//! ```

pub mod checksum;
pub mod clock;
pub mod conflict;
pub mod error;
pub mod record;

pub use checksum::task_checksum;
pub use clock::{ClockRelation, VectorClock};
pub use conflict::{
    auto_resolve_comment, auto_resolve_task, detect_conflict, CommentMergeOutcome, ConflictOutcome,
    TaskMergeOutcome,
};
pub use error::Error;
pub use record::{CommentFields, EntityType, TaskFields, TaskPriority, TaskStatus};

/// Device identifiers key every vector clock component and are rendered as
/// canonical UUID strings at the boundary.
pub type DeviceId = String;
