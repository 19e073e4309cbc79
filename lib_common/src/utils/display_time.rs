//! # Display Time
//!
//! Results carry their timestamps as epoch milliseconds. The table shows them as
//! `H:M:S.mmm` in a configurable time zone. The components are plain decimal
//! numbers without zero padding (`9:5:7.42` is 09:05:07.042), which keeps the
//! output stable for a given instant and zone.

use chrono::{TimeZone, Timelike};
use chrono_tz::Tz;
use thiserror::Error;

/// Returned when a configured time zone name is not part of the IANA database.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown time zone '{0}'")]
pub struct UnknownTimeZone(pub String);

/// Resolves an IANA time zone name such as `Europe/Riga` or `UTC`.
pub fn parse_time_zone(name: &str) -> Result<Tz, UnknownTimeZone> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| UnknownTimeZone(name.to_string()))
}

/// Formats an epoch timestamp in milliseconds as `H:M:S.mmm` in `tz`.
///
/// Returns `None` when the value lies outside the range chrono can represent.
pub fn format_epoch_millis(millis: i64, tz: Tz) -> Option<String> {
    let instant = tz.timestamp_millis_opt(millis).single()?;
    Some(format!(
        "{}:{}:{}.{}",
        instant.hour(),
        instant.minute(),
        instant.second(),
        instant.timestamp_subsec_millis()
    ))
}
