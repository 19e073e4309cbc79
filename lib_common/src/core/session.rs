//! # Feed Session
//!
//! The session is the single task that owns the [`ReconciliationStore`] and the
//! current [`ConnectionHandle`]. Everything that can change either of them
//! arrives as a message and is handled one at a time inside [`FeedSession::run`]:
//!
//! - transport events of the current connection (`Opened`, `Message`,
//!   `Closed`, `Failed`),
//! - commands from [`FeedHandle`]s (`Reopen`, `Close`, `Shutdown`),
//! - the connect deadline and the reconnect timer.
//!
//! The message reducer always works on `&mut self`, so it sees the latest
//! collection no matter how often the connection was replaced. Snapshots and the
//! connection state are published through `watch` channels for any number of
//! readers.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use super::lifecycle::{ConnectionState, LifecycleEvent};
use super::reconnect::{NoReconnect, ReconnectPolicy};
use super::transport::{ConnectionHandle, Transport, TransportEvent};
use crate::results::store::{ReconciliationStore, Snapshot};

/// Requests accepted by a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Release the current connection (if any) and activate a new one.
    Reopen,
    /// Release the current connection and stay closed.
    Close,
    /// Release the current connection and end the session.
    Shutdown,
}

/// Cloneable remote control and read side of a session.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<Snapshot>,
    states: watch::Receiver<ConnectionState>,
}

impl FeedHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Latest published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.states.borrow()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe_states(&self) -> watch::Receiver<ConnectionState> {
        self.states.clone()
    }

    /// Returns `false` if the session has already ended.
    pub fn reopen(&self) -> bool {
        self.commands.send(SessionCommand::Reopen).is_ok()
    }

    pub fn close(&self) -> bool {
        self.commands.send(SessionCommand::Close).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.commands.send(SessionCommand::Shutdown).is_ok()
    }
}

/// Owns the store and the connection of one results feed.
pub struct FeedSession<T: Transport> {
    transport: T,
    endpoint: Url,
    store: ReconciliationStore,
    policy: Box<dyn ReconnectPolicy>,
    connect_timeout: Option<Duration>,

    connection: Option<ConnectionHandle>,
    state: ConnectionState,
    activations: u64,
    reconnect_attempt: u32,
    connect_deadline: Option<Instant>,
    retry_at: Option<Instant>,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot_tx: watch::Sender<Snapshot>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<T: Transport> FeedSession<T> {
    /// Creates an inactive session and the handle used to observe and control it.
    pub fn new(transport: T, endpoint: Url, store: ReconciliationStore) -> (Self, FeedHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(store.current());
        let (state_tx, states) = watch::channel(ConnectionState::Uninitialized);

        let session = Self {
            transport,
            endpoint,
            store,
            policy: Box::new(NoReconnect),
            connect_timeout: None,
            connection: None,
            state: ConnectionState::Uninitialized,
            activations: 0,
            reconnect_attempt: 0,
            connect_deadline: None,
            retry_at: None,
            commands,
            snapshot_tx,
            state_tx,
        };
        let handle = FeedHandle {
            commands: command_tx,
            snapshots,
            states,
        };
        (session, handle)
    }

    pub fn with_reconnect_policy(mut self, policy: Box<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Closes a connection that has not opened within `timeout`. `None` waits
    /// forever.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.current()
    }

    /// Number of connection handles requested so far.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Activates, then processes events and commands until shut down.
    /// Returns the final snapshot.
    pub async fn run(mut self) -> Snapshot {
        self.activate();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Reopen) => self.reopen(),
                    Some(SessionCommand::Close) => self.close(),
                    Some(SessionCommand::Shutdown) | None => break,
                },
                event = next_event(self.connection.as_mut()) => match event {
                    Some(event) => self.handle_event(event),
                    None => self.transport_gone(),
                },
                _ = sleep_until(self.connect_deadline) => self.connect_timed_out(),
                _ = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.activate();
                }
            }
        }

        self.teardown();
        self.store.current()
    }

    /// Requests a connection handle if the state machine allows it.
    pub fn activate(&mut self) {
        let Some(next) = self.state.on(LifecycleEvent::Activate) else {
            log::debug!("Ignoring activation while {}", self.state);
            return;
        };
        self.activations += 1;
        log::info!(
            "Connecting to results feed {} (activation {})",
            self.endpoint,
            self.activations
        );
        self.connection = Some(self.transport.open(&self.endpoint));
        self.connect_deadline = self.connect_timeout.map(|timeout| Instant::now() + timeout);
        self.set_state(next);
    }

    /// Explicit re-open: releases the current connection and activates a new one.
    pub fn reopen(&mut self) {
        log::info!("Re-opening results feed");
        self.release(LifecycleEvent::CloseRequested);
        self.retry_at = None;
        self.reconnect_attempt = 0;
        self.activate();
    }

    /// Explicit close. Never followed by a reconnect.
    pub fn close(&mut self) {
        self.retry_at = None;
        self.release(LifecycleEvent::CloseRequested);
    }

    /// Releases everything. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.close();
        log::info!("Results feed session stopped after {} activation(s)", self.activations);
    }

    /// Applies one transport event of the current connection.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => match self.state.on(LifecycleEvent::TransportOpened) {
                Some(next) => {
                    log::info!("Results feed open");
                    self.connect_deadline = None;
                    self.reconnect_attempt = 0;
                    self.set_state(next);
                }
                None => log::debug!("Ignoring open signal while {}", self.state),
            },
            TransportEvent::Message(frame) => self.ingest(&frame),
            TransportEvent::Closed(reason) => {
                let reason = reason.as_deref().unwrap_or("no reason given");
                log::info!("Results feed closed by remote: {}", reason);
                self.lost(LifecycleEvent::TransportClosed);
            }
            TransportEvent::Failed(error) => {
                log::error!("Results feed error: {}", error);
                self.lost(LifecycleEvent::TransportFailed);
            }
        }
    }

    fn ingest(&mut self, frame: &str) {
        if self.connection.is_none() {
            log::debug!("Dropping message received without a live connection");
            return;
        }
        let previous = self.snapshot_tx.borrow().clone();
        match self.store.ingest_frame(frame) {
            Ok(snapshot) if !snapshot.same_as(&previous) => {
                log::debug!(
                    "Results updated to version {} ({} records)",
                    snapshot.version(),
                    snapshot.len()
                );
                self.snapshot_tx.send_replace(snapshot);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Discarding results message: {}", e),
        }
    }

    /// The event channel ended without a close signal.
    fn transport_gone(&mut self) {
        if self.state.is_live() {
            log::warn!("Results feed transport went away without closing");
            self.lost(LifecycleEvent::TransportClosed);
        } else {
            self.connection = None;
        }
    }

    fn connect_timed_out(&mut self) {
        self.connect_deadline = None;
        if self.state != ConnectionState::Connecting {
            return;
        }
        let waited = self.connect_timeout.unwrap_or_default();
        log::warn!("Results feed did not open within {:?}", waited);
        self.release(LifecycleEvent::ConnectTimedOut);
        self.schedule_reconnect();
    }

    fn lost(&mut self, event: LifecycleEvent) {
        if !self.state.is_live() {
            log::debug!("Ignoring {:?} while {}", event, self.state);
            return;
        }
        self.release(event);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.policy.next_delay(self.reconnect_attempt) {
            Some(delay) => {
                self.reconnect_attempt += 1;
                log::warn!(
                    "Reconnecting to results feed in {}ms (attempt {})",
                    delay.as_millis(),
                    self.reconnect_attempt
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => log::info!("Results feed stays closed"),
        }
    }

    fn release(&mut self, event: LifecycleEvent) {
        if let Some(next) = self.state.on(event) {
            self.set_state(next);
        }
        self.connect_deadline = None;
        if let Some(mut connection) = self.connection.take() {
            if connection.close() {
                log::info!("Released results feed connection (activation {})", self.activations);
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            log::info!("Transitioning feed state: {} -> {}", self.state, next);
            self.state = next;
            self.state_tx.send_replace(next);
        }
    }
}

async fn next_event(connection: Option<&mut ConnectionHandle>) -> Option<TransportEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
