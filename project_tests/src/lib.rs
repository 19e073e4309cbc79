//! Test support: a loopback WebSocket results server.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{WebSocketStream, accept_async};
use url::Url;

/// Accepts WebSocket clients on `127.0.0.1` at a random port.
pub struct LoopbackServer {
    url: Url,
    peers: mpsc::UnboundedReceiver<LoopbackPeer>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("ws://{}/dashboard", listener.local_addr()?))?;
        let (tx, peers) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(LoopbackPeer::spawn(ws)).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("loopback handshake failed: {}", e),
                }
            }
        });

        Ok(Self { url, peers, task })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Next accepted client.
    pub async fn next_peer(&mut self) -> Option<LoopbackPeer> {
        self.peers.recv().await
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Server side of one accepted client.
pub struct LoopbackPeer {
    outgoing: mpsc::UnboundedSender<Message>,
    closed: watch::Receiver<bool>,
}

impl LoopbackPeer {
    fn spawn(ws: WebSocketStream<TcpStream>) -> Self {
        let (outgoing, mut rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed) = watch::channel(false);

        tokio::spawn(async move {
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
            let _ = closed_tx.send(true);
        });

        Self { outgoing, closed }
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.outgoing.send(Message::text(text.to_string())).is_ok()
    }

    pub fn send_binary(&self, bytes: &[u8]) -> bool {
        self.outgoing.send(Message::binary(bytes.to_vec())).is_ok()
    }

    /// Starts the close handshake with a normal close code.
    pub fn close(&self, reason: &str) -> bool {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        self.outgoing.send(Message::Close(Some(frame))).is_ok()
    }

    /// Resolves once the client has closed the socket or gone away.
    pub async fn wait_closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}
