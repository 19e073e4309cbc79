//! # lib_common
//!
//! Shared building blocks of the live results viewer. Every top-level folder is
//! gated behind a cargo feature of the same name so that binaries only pull in
//! what they use:
//!
//! - **`results`**: record normalization, the reconciliation store and the
//!   plain-text table projection.
//! - **`core`**: the connection lifecycle state machine, reconnect policies, the
//!   transport abstraction and the feed session that ties them together.
//! - **`ingestors`**: concrete transports (WebSocket).

#[cfg(feature = "results")]
pub mod utils;

#[cfg(feature = "results")]
pub mod results;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ingestors")]
pub mod ingestors;

// Re-export the types most callers need.
#[cfg(feature = "results")]
pub use results::{
    Record, RecordId, RecordNormalizer, ReconciliationStore, Snapshot, ZeroTimePolicy,
};

#[cfg(feature = "core")]
pub use crate::core::{ConnectionState, FeedHandle, FeedSession, SessionCommand};
