//! # Utilities Module
//!
//! General-purpose helpers that are shared by several modules of `lib_common`
//! but do not belong to any of them.
//!
//! ## Contained Modules:
//!
//! - **`display_time`**: converts epoch timestamps into the compact
//!   `H:M:S.mmm` strings shown in the results table, and resolves the display
//!   time zone from its IANA name.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Epoch-to-display time formatting.
pub mod display_time;

pub use display_time::{format_epoch_millis, parse_time_zone};
