//! # Core Feed Module
//!
//! Everything between a raw transport and the reconciliation store. The feed
//! session owns the store and the current connection, drives the connection
//! lifecycle, and publishes snapshots and state to any number of readers.
//!
//! ## Core Components:
//!
//! - **`lifecycle`**: the `Uninitialized → Connecting → Open → Closed` state
//!   machine.
//!
//! - **`reconnect`**: injectable policies deciding whether a dropped connection
//!   is re-activated, and after which delay.
//!
//! - **`transport`**: the `Transport` trait, connection handles with
//!   exactly-once release, and an in-memory transport for tests and demos.
//!
//! - **`session`**: the single task that applies transport events and
//!   commands to the store, one message at a time.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Connection state machine.
pub mod lifecycle;
/// Reconnect policies.
pub mod reconnect;
/// Transport abstraction and the in-memory transport.
pub mod transport;
/// The feed session and its handle.
pub mod session;

// --- Public API Re-exports ---
pub use lifecycle::{ConnectionState, LifecycleEvent};
pub use reconnect::{ExponentialBackoff, NoReconnect, ReconnectPolicy};
pub use session::{FeedHandle, FeedSession, SessionCommand};
pub use transport::{
    validate_endpoint, ConnectionHandle, MemoryPeer, MemoryTransport, Transport, TransportError,
    TransportEvent,
};
