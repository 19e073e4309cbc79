//! # Transports Module
//!
//! Concrete transports for the results feed. Each one hides a wire protocol
//! behind the [`Transport`](crate::core::Transport) trait so the session only
//! ever deals in events.
//!
//! ## Contained Modules:
//! - **`results_wss`**: WebSocket client for the live results endpoint.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// WebSocket transport for the live results endpoint.
pub mod results_wss;

// --- Public API Re-exports ---
pub use results_wss::WsTransport;
