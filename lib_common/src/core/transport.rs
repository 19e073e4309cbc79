//! # Transport Abstraction
//!
//! A transport turns an endpoint into a [`ConnectionHandle`]: a stream of
//! [`TransportEvent`]s plus the means to release the connection. How the bytes
//! move (WebSocket, test channels, ...) is the transport's business; the feed
//! session only ever sees events.
//!
//! Releasing a handle cancels its token and closes its event channel. Anything
//! the transport tries to deliver afterwards is rejected at the channel, so a
//! released handle can never reach the store again.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Lifecycle signals and framed payloads delivered by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open.
    Opened,
    /// One framed text payload.
    Message(String),
    /// The remote side closed the channel, with its reason if it gave one.
    Closed(Option<String>),
    /// The channel failed.
    Failed(String),
}

/// Endpoint problems detected before any connection attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("unsupported endpoint scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
}

/// Parses and checks a feed endpoint. Only `ws` and `wss` are accepted.
pub fn validate_endpoint(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
}

/// Opens connections.
pub trait Transport: Send + Sync {
    /// Starts connecting to `endpoint`. Progress and failures are reported
    /// through the events of the returned handle, never as a return value.
    fn open(&self, endpoint: &Url) -> ConnectionHandle;
}

/// A live connection as seen by its consumer.
#[derive(Debug)]
pub struct ConnectionHandle {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    release: Option<CancellationToken>,
}

impl ConnectionHandle {
    /// Wraps the receiving half of a transport's event channel. `release` is
    /// cancelled when the handle is closed.
    pub fn new(
        events: mpsc::UnboundedReceiver<TransportEvent>,
        release: CancellationToken,
    ) -> Self {
        Self {
            events,
            release: Some(release),
        }
    }

    /// Next event, or `None` once the transport has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Releases the connection. Returns `true` only for the call that actually
    /// released it.
    pub fn close(&mut self) -> bool {
        match self.release.take() {
            Some(token) => {
                token.cancel();
                self.events.close();
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// In-process transport driven by hand. Every `open` creates a [`MemoryPeer`]
/// that plays the server side of that connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many connections have been opened so far.
    pub fn opened(&self) -> usize {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Server side of the `n`-th opened connection (zero-based).
    pub fn peer(&self, n: usize) -> Option<MemoryPeer> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).get(n).cloned()
    }

    /// Server side of the most recently opened connection.
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, _endpoint: &Url) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let release = CancellationToken::new();
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MemoryPeer {
                events: tx,
                release: release.clone(),
            });
        ConnectionHandle::new(rx, release)
    }
}

/// The far end of a [`MemoryTransport`] connection. Every method returns
/// `false` when the consumer has already released the connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    release: CancellationToken,
}

impl MemoryPeer {
    pub fn open(&self) -> bool {
        self.send(TransportEvent::Opened)
    }

    /// Delivers one framed payload.
    pub fn deliver(&self, frame: impl Into<String>) -> bool {
        self.send(TransportEvent::Message(frame.into()))
    }

    pub fn close(&self, reason: Option<&str>) -> bool {
        self.send(TransportEvent::Closed(reason.map(str::to_string)))
    }

    pub fn fail(&self, error: &str) -> bool {
        self.send(TransportEvent::Failed(error.to_string()))
    }

    /// True once the consumer released the connection.
    pub fn is_released(&self) -> bool {
        self.release.is_cancelled()
    }

    fn send(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
