use chrono::Utc;
use clap::Parser;
use lib_common::core::validate_endpoint;
use lib_common::ingestors::WsTransport;
use lib_common::{FeedSession, ReconciliationStore};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Connects to a live results feed and reports update rates", long_about = None)]
struct Args {
    /// Results feed URL
    #[clap(short, long, default_value = "ws://localhost:8080/dashboard")]
    url: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 60)]
    report_interval_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let args = Args::parse();
    let endpoint = validate_endpoint(&args.url)?;

    let (session, feed) = FeedSession::new(WsTransport::new(), endpoint, ReconciliationStore::default());
    let session_handle = tokio::spawn(session.run());

    let mut snapshots = feed.subscribe_snapshots();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.report_interval_seconds.max(1)));
    ticker.tick().await;
    let mut updates: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                updates += 1;
            }
            _ = ticker.tick() => {
                let snapshot = feed.snapshot();
                println!(
                    "[{}] state={} records={} finished={} updates/interval={}",
                    Utc::now().format("%H:%M:%S"),
                    feed.state(),
                    snapshot.len(),
                    snapshot.iter().filter(|r| r.is_finished()).count(),
                    updates
                );
                updates = 0;
            }
        }
    }

    feed.shutdown();
    let final_snapshot = session_handle.await?;
    println!("Final snapshot: {} records (version {})", final_snapshot.len(), final_snapshot.version());
    Ok(())
}
