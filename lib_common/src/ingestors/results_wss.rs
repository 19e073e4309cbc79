//! # Results WSS Transport
//!
//! WebSocket implementation of [`Transport`]. Each `open` spawns one pump task
//! that owns the socket, forwards every frame as a [`TransportEvent`] and stops
//! as soon as the consumer releases the handle.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::transport::{ConnectionHandle, Transport, TransportEvent};

/// Connects with `tokio-tungstenite`. `ws://` and `wss://` are both supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    /// Must be called from within a tokio runtime.
    fn open(&self, endpoint: &Url) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let release = CancellationToken::new();
        tokio::spawn(pump(endpoint.clone(), tx, release.clone()));
        ConnectionHandle::new(rx, release)
    }
}

async fn pump(
    endpoint: Url,
    events: mpsc::UnboundedSender<TransportEvent>,
    release: CancellationToken,
) {
    let connected = tokio::select! {
        _ = release.cancelled() => {
            log::debug!("Connection to {} released before it opened", endpoint);
            return;
        }
        result = connect_async(endpoint.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            let error = format!("connect to {} failed: {}", endpoint, e);
            let _ = events.send(TransportEvent::Failed(error));
            return;
        }
    };

    log::info!("Successfully connected to results feed {}", endpoint);
    if events.send(TransportEvent::Opened).is_err() {
        return;
    }
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = release.cancelled() => {
                if let Err(e) = write.close().await {
                    log::debug!("WSS close handshake failed: {}", e);
                }
                return;
            }
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => {
                        TransportEvent::Message(text.as_str().to_owned())
                    }
                    Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin.to_vec()) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(e) => {
                            log::warn!("Dropping binary frame that is not UTF-8: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        let _ = events.send(TransportEvent::Closed(reason));
                        return;
                    }
                    // Ping and pong are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let error = format!("WSS read error: {}", e);
                        let _ = events.send(TransportEvent::Failed(error));
                        return;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed(None));
                        return;
                    }
                };
                if events.send(event).is_err() {
                    return;
                }
            }
        }
    }
}
