//! # Result Records
//!
//! Canonical shape of one competitor/checkpoint result and the normalizer that
//! produces it from a decoded inbound payload.
//!
//! The producer controls the payload, so the normalizer never fails. Whatever
//! cannot be interpreted degrades to an empty value and the rest of the payload
//! is carried through untouched.

use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::utils::display_time::format_epoch_millis;

/// Field names understood by the normalizer and the table projection.
pub mod fields {
    /// Merge key.
    pub const ID: &str = "id";
    /// Finish timestamp, epoch milliseconds on the wire.
    pub const TIME_FINISH: &str = "time_finish";
    /// Start timestamp, epoch milliseconds on the wire.
    pub const TIME_START: &str = "time_start";
    /// Checkpoint the result was recorded at.
    pub const CHECKPOINT_ID: &str = "checkpoint_id";
    /// Start number (older producers call it `start_number`).
    pub const SPORTSMEN_ID: &str = "sportsmen_id";
    /// Alias of [`SPORTSMEN_ID`].
    pub const START_NUMBER: &str = "start_number";
    /// Competitor display name (older producers call it `name`).
    pub const SPORTSMEN_NAME: &str = "sportsmen_name";
    /// Alias of [`SPORTSMEN_NAME`].
    pub const NAME: &str = "name";
    /// Optional status of the result.
    pub const EVENT_STATE_ID: &str = "event_state_id";
}

/// Identity of a result entity.
///
/// Producers send either numbers or strings (UUIDs). Numbers are compared by
/// value (`1000`, `1e3` and `1000.0` are the same id) and never share space with
/// strings: `1` and `"1"` are different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    /// Integral number within the `i64` range.
    Int(i64),
    /// Integral number above `i64::MAX`.
    Unsigned(u64),
    /// Any other number, in its shortest round-trip decimal form.
    Number(String),
    /// String id.
    Text(String),
}

impl RecordId {
    /// Extracts an id from a JSON value. Only scalars qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(n)),
            Value::String(s) => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }

    fn from_number(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            return RecordId::Int(i);
        }
        if let Some(u) = n.as_u64() {
            return RecordId::Unsigned(u);
        }
        match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 => {
                // i64::MAX as f64 and u64::MAX as f64 round up to 2^63 and 2^64.
                if f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    RecordId::Int(f as i64)
                } else if f >= 0.0 && f < u64::MAX as f64 {
                    RecordId::Unsigned(f as u64)
                } else {
                    RecordId::Number(f.to_string())
                }
            }
            Some(f) => RecordId::Number(f.to_string()),
            None => RecordId::Number(n.to_string()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Unsigned(n) => write!(f, "{}", n),
            RecordId::Number(s) | RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordId::Int(n) => serializer.serialize_i64(*n),
            RecordId::Unsigned(n) => serializer.serialize_u64(*n),
            RecordId::Number(s) => match s.parse::<f64>() {
                Ok(f) => serializer.serialize_f64(f),
                Err(_) => serializer.serialize_str(s),
            },
            RecordId::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

/// One entry of the results collection.
///
/// `fields` holds every delivered field except `id` and `time_finish`, exactly as
/// received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Merge key. `None` when the payload carried no usable id; such records are
    /// always appended and never updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Display-ready finish time (`H:M:S.mmm`) or an empty string.
    pub time_finish: String,
    /// Pass-through fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Raw access to a pass-through field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn checkpoint_id(&self) -> Option<&Value> {
        self.field(fields::CHECKPOINT_ID)
    }

    /// Start number, from `sportsmen_id` or its older alias `start_number`.
    pub fn start_number(&self) -> Option<&Value> {
        self.field(fields::SPORTSMEN_ID)
            .or_else(|| self.field(fields::START_NUMBER))
    }

    /// Competitor name, from `sportsmen_name` or its older alias `name`.
    pub fn name(&self) -> Option<&Value> {
        self.field(fields::SPORTSMEN_NAME)
            .or_else(|| self.field(fields::NAME))
    }

    pub fn event_state_id(&self) -> Option<&Value> {
        self.field(fields::EVENT_STATE_ID)
    }

    pub fn time_start(&self) -> Option<&Value> {
        self.field(fields::TIME_START)
    }

    /// True once a finish time has been recorded.
    pub fn is_finished(&self) -> bool {
        !self.time_finish.is_empty()
    }
}

/// How a `time_finish` of exactly `0` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroTimePolicy {
    /// `0` means "not finished yet" and normalizes to an empty string.
    #[default]
    Absent,
    /// `0` is a real instant (the epoch) and is formatted like any other value.
    Present,
}

/// Converts decoded payload objects into [`Record`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordNormalizer {
    tz: Tz,
    zero_time: ZeroTimePolicy,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(Tz::UTC, ZeroTimePolicy::default())
    }
}

impl RecordNormalizer {
    pub fn new(tz: Tz, zero_time: ZeroTimePolicy) -> Self {
        Self { tz, zero_time }
    }

    /// Time zone used for display strings.
    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn zero_time_policy(&self) -> ZeroTimePolicy {
        self.zero_time
    }

    /// Builds the canonical record for one payload object.
    pub fn normalize(&self, mut raw: Map<String, Value>) -> Record {
        // A non-scalar id stays in the pass-through fields so nothing is lost.
        let id = raw.get(fields::ID).and_then(RecordId::from_value);
        if id.is_some() {
            raw.remove(fields::ID);
        }

        let time_finish = self.display_time(raw.remove(fields::TIME_FINISH).as_ref());

        Record {
            id,
            time_finish,
            fields: raw,
        }
    }

    /// Normalizes a raw timestamp value into its display string.
    ///
    /// Numbers are epoch milliseconds. Non-empty strings are assumed to be
    /// formatted already and are kept as they are. Everything else is empty.
    pub fn display_time(&self, value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::Number(n)) => {
                let millis = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64));
                let Some(millis) = millis else {
                    log::warn!("Timestamp {} is not representable, leaving it empty", n);
                    return String::new();
                };
                let is_zero = n.as_f64().is_some_and(|f| f == 0.0);
                if is_zero && self.zero_time == ZeroTimePolicy::Absent {
                    return String::new();
                }
                format_epoch_millis(millis, self.tz).unwrap_or_else(|| {
                    log::warn!("Timestamp {} is outside the calendar range, leaving it empty", millis);
                    String::new()
                })
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                log::debug!("Ignoring non-timestamp value {}", other);
                String::new()
            }
        }
    }
}
