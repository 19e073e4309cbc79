//! # Results Module
//!
//! The data side of the viewer: what a result record looks like, how inbound
//! payloads are normalized into records, how they are reconciled into one
//! deduplicated, ordered collection, and how that collection is projected into
//! a text table.
//!
//! ## Contained Modules:
//!
//! - **`record`**: the `Record` type, its identity (`RecordId`) and the
//!   `RecordNormalizer` that turns raw epoch timestamps into display strings.
//! - **`store`**: the `ReconciliationStore`, single owner of the collection,
//!   which hands out immutable `Snapshot`s after every merge.
//! - **`table`**: stateless rendering of a snapshot.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Record shape and normalization.
pub mod record;
/// Upsert-by-identity store and snapshots.
pub mod store;
/// Text table projection.
pub mod table;

// --- Public API Re-exports ---
pub use record::{Record, RecordId, RecordNormalizer, ZeroTimePolicy};
pub use store::{IngestError, ReconciliationStore, Snapshot};
pub use table::render_table;
