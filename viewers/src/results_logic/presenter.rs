//! Redraws the results table on stdout whenever the feed publishes a new
//! snapshot or connection state.

use std::io::{self, IsTerminal, Write};

use chrono_tz::Tz;
use colored::Colorize;
use lib_common::core::{ConnectionState, FeedHandle};
use lib_common::results::{render_table, Snapshot};
use tokio::sync::broadcast;

pub async fn run(feed: FeedHandle, tz: Tz, mut shutdown: broadcast::Receiver<()>) {
    let mut snapshots = feed.subscribe_snapshots();
    let mut states = feed.subscribe_states();
    let clear = io::stdout().is_terminal();

    draw(&feed, tz, clear);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        draw(&feed, tz, clear);
    }
    log::debug!("Presenter stopped.");
}

fn draw(feed: &FeedHandle, tz: Tz, clear: bool) {
    let frame = render_frame(feed.state(), &feed.snapshot(), tz);
    let mut out = io::stdout().lock();
    let written = if clear {
        write!(out, "\x1B[2J\x1B[H{}", frame)
    } else {
        writeln!(out, "{}", frame)
    };
    if let Err(e) = written.and_then(|_| out.flush()) {
        log::warn!("Failed to draw results table: {}", e);
    }
}

/// Status line followed by the table.
pub fn render_frame(state: ConnectionState, snapshot: &Snapshot, tz: Tz) -> String {
    let label = state.to_string();
    let label = match state {
        ConnectionState::Open => label.green(),
        ConnectionState::Connecting => label.yellow(),
        ConnectionState::Closed => label.red(),
        ConnectionState::Uninitialized => label.dimmed(),
    };
    format!(
        "{} feed {} | {} records | version {}\n{}\n",
        "Results".bold(),
        label,
        snapshot.len(),
        snapshot.version(),
        render_table(snapshot, tz)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::results::ReconciliationStore;

    #[test]
    fn frame_shows_state_and_rows() {
        colored::control::set_override(false);
        let mut store = ReconciliationStore::default();
        let snapshot = store
            .ingest_frame(r#"[{"id":7,"sportsmen_id":12,"sportsmen_name":"Anna","time_finish":1000}]"#)
            .unwrap();

        let frame = render_frame(ConnectionState::Open, &snapshot, chrono_tz::UTC);
        let mut lines = frame.lines();
        assert_eq!(lines.next(), Some("Results feed open | 1 records | version 1"));
        assert!(lines.next().unwrap().starts_with("ID"));
        assert!(frame.contains("Anna"));
        assert!(frame.contains("0:0:1.0"));
    }
}
