//! Request handlers for sync operations.

mod conflicts;
mod pull;
mod push;

pub use conflicts::*;
pub use pull::*;
pub use push::*;
