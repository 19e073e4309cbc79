use anyhow::Result;
use tokio::signal;

use lib_common::ingestors::WsTransport;
use lib_common::{FeedSession, ReconciliationStore};

mod results_logic;
use results_logic::{config, logger, presenter};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let settings = config::load_config().resolve()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;

    let (session, feed) = FeedSession::new(
        WsTransport::new(),
        settings.endpoint.clone(),
        ReconciliationStore::new(settings.normalizer),
    );
    let session = session
        .with_reconnect_policy(settings.reconnect_policy())
        .with_connect_timeout(settings.connect_timeout);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let session_handle = tokio::spawn(session.run());
    let presenter_handle = tokio::spawn(presenter::run(
        feed.clone(),
        settings.display_tz(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Stop the presenter, then release the feed connection
    let _ = shutdown_tx.send(());
    feed.shutdown();

    let (final_snapshot, _) = tokio::try_join!(session_handle, presenter_handle)?;

    log::info!("Shutdown complete with {} records.", final_snapshot.len());
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}
