//! Plain-text projection of a [`Snapshot`]. Holds no state.

use chrono_tz::Tz;
use serde_json::Value;

use super::record::Record;
use super::store::Snapshot;
use crate::utils::display_time::format_epoch_millis;

const HEADERS: [&str; 7] = ["ID", "No.", "Name", "Checkpoint", "State", "Start", "Finish"];
const MISSING: &str = "-";

/// Renders the snapshot as an aligned text table, one row per record, in
/// collection order. `tz` is used to display numeric start times.
pub fn render_table(snapshot: &Snapshot, tz: Tz) -> String {
    let rows: Vec<[String; 7]> = snapshot.iter().map(|record| row(record, tz)).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(String::from), &widths);
    push_line(&mut out, &widths.map(|w| "-".repeat(w)), &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn row(record: &Record, tz: Tz) -> [String; 7] {
    [
        record.id.as_ref().map_or_else(|| MISSING.to_string(), |id| id.to_string()),
        cell(record.start_number()),
        cell(record.name()),
        cell(record.checkpoint_id()),
        cell(record.event_state_id()),
        match record.time_start() {
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|millis| format_epoch_millis(millis, tz))
                .unwrap_or_else(|| n.to_string()),
            other => cell(other),
        },
        if record.time_finish.is_empty() {
            MISSING.to_string()
        } else {
            record.time_finish.clone()
        },
    ]
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING.to_string(),
        Some(Value::String(s)) if s.is_empty() => MISSING.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_line(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        line.push_str(&" ".repeat(width - cell.chars().count()));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
