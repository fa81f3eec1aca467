//! Reconnecting transport, the single path to the collector.
//!
//! A [`Transport`] is a cheap, cloneable handle. All state (the connection,
//! the outbound queue, the retry timer) is owned by one background worker
//! task, and every handle talks to it over an unbounded channel. Commands
//! are therefore applied strictly in submission order, which is what keeps
//! queued frames in FIFO order across reconnects.

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, info, warn};
use vigil_core::TransportError;

use crate::connection::{Connection, Connector};

/// Lifecycle of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub endpoint: String,
    /// Failed connection attempts before automatic retries stop.
    pub reconnection_attempts: u32,
    /// Delay before each automatic retry.
    pub reconnection_timeout: Duration,
    /// Outbound backlog cap; the oldest frame is dropped when exceeded.
    pub max_queued_messages: usize,
}

impl TransportOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &vigil_config::VigilConfig) -> Self {
        Self {
            endpoint: config.collector_endpoint.clone(),
            reconnection_attempts: config.transport.reconnection_attempts,
            reconnection_timeout: Duration::from_millis(config.transport.reconnection_timeout_ms),
            max_queued_messages: config.transport.max_queued_messages,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7070".into(),
            reconnection_attempts: 5,
            reconnection_timeout: Duration::from_secs(10),
            max_queued_messages: 1000,
        }
    }
}

type Ack = oneshot::Sender<Result<(), TransportError>>;

enum Command {
    Send { frame: String, ack: Option<Ack> },
    Reconnect,
    Shutdown { done: oneshot::Sender<()> },
}

/// Handle to the transport worker.
#[derive(Clone)]
pub struct Transport {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    queued: Arc<AtomicUsize>,
}

impl Transport {
    /// Spawn the transport worker. Must be called inside a tokio runtime.
    ///
    /// No connection is made until the first message is submitted.
    pub fn new(connector: Arc<dyn Connector>, options: TransportOptions) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let queued = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            attempts_left: options.reconnection_attempts,
            connector,
            options,
            commands: rx,
            state_tx,
            queued: Arc::clone(&queued),
            queue: VecDeque::new(),
            connection: None,
            connecting: None,
            retry_timer: None,
            exhausted: false,
        };
        tokio::spawn(worker.run());

        Self {
            commands,
            state,
            queued,
        }
    }

    /// Submit a message, fire-and-forget.
    ///
    /// Written immediately when the connection is open, queued otherwise.
    /// Failures are logged, never returned.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping message that failed to serialize");
                return;
            }
        };

        if self.commands.send(Command::Send { frame, ack: None }).is_err() {
            warn!("Transport is shut down, message dropped");
        }
    }

    /// Submit a message and wait until it reaches the wire.
    ///
    /// If the connection attempt the message is waiting on fails, the
    /// message is withdrawn from the queue and the error is returned, so
    /// the caller still owns it and may retry without duplicating it.
    pub async fn deliver<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TransportError> {
        let frame = serde_json::to_string(message)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        let (ack, done) = oneshot::channel();

        self.commands
            .send(Command::Send {
                frame,
                ack: Some(ack),
            })
            .map_err(|_| TransportError::Closed)?;

        done.await.unwrap_or(Err(TransportError::Closed))
    }

    /// Force a connection attempt now, even after automatic retries gave up.
    pub fn reconnect(&self) {
        if self.commands.send(Command::Reconnect).is_err() {
            warn!("Transport is shut down, reconnect ignored");
        }
    }

    /// Drain what can be drained, close the connection and stop the worker.
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = finished.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| *s == state).await;
    }

    /// Frames waiting for a connection.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}

struct Outbound {
    frame: String,
    ack: Option<Ack>,
}

type PendingConnect = BoxFuture<'static, Result<Box<dyn Connection>, TransportError>>;

enum Wake {
    Command(Option<Command>),
    ConnectFinished(Result<Box<dyn Connection>, TransportError>),
    RetryDue,
}

struct Worker {
    connector: Arc<dyn Connector>,
    options: TransportOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    queued: Arc<AtomicUsize>,
    queue: VecDeque<Outbound>,
    connection: Option<Box<dyn Connection>>,
    connecting: Option<PendingConnect>,
    /// At most one pending retry at a time.
    retry_timer: Option<Pin<Box<Sleep>>>,
    attempts_left: u32,
    exhausted: bool,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                cmd = self.commands.recv() => Wake::Command(cmd),
                result = wait_connect(&mut self.connecting) => Wake::ConnectFinished(result),
                () = wait_retry(&mut self.retry_timer) => Wake::RetryDue,
            };

            match wake {
                Wake::Command(Some(Command::Send { frame, ack })) => {
                    self.on_send(Outbound { frame, ack }).await;
                }
                Wake::Command(Some(Command::Reconnect)) => self.force_reconnect(),
                Wake::Command(Some(Command::Shutdown { done })) => {
                    self.close().await;
                    let _ = done.send(());
                    return;
                }
                Wake::Command(None) => {
                    self.close().await;
                    return;
                }
                Wake::ConnectFinished(Ok(connection)) => self.on_connected(connection).await,
                Wake::ConnectFinished(Err(e)) => self.on_connect_failed(e),
                Wake::RetryDue => {
                    debug!(endpoint = %self.options.endpoint, "Retrying connection");
                    self.begin_connect();
                }
            }

            self.queued.store(self.queue.len(), Ordering::Relaxed);
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    async fn on_send(&mut self, outbound: Outbound) {
        match self.state() {
            ConnectionState::Open => {
                self.write(outbound).await;
            }
            ConnectionState::Connecting | ConnectionState::Closing => self.enqueue(outbound),
            ConnectionState::Disconnected => {
                let mut outbound = outbound;
                if self.exhausted {
                    // Nothing will retry on its own; hand tracked messages back.
                    if let Some(ack) = outbound.ack.take() {
                        let _ = ack.send(Err(TransportError::ConnectionFailed {
                            endpoint: self.options.endpoint.clone(),
                            reason: "reconnection attempts exhausted".into(),
                        }));
                        return;
                    }
                }
                self.enqueue(outbound);
                self.ensure_connecting();
            }
        }
    }

    fn enqueue(&mut self, outbound: Outbound) {
        if self.queue.len() >= self.options.max_queued_messages {
            if let Some(dropped) = self.queue.pop_front() {
                warn!(
                    limit = self.options.max_queued_messages,
                    "Outbound queue full, dropping oldest message"
                );
                if let Some(ack) = dropped.ack {
                    let _ = ack.send(Err(TransportError::WriteFailed(
                        "dropped from full outbound queue".into(),
                    )));
                }
            }
        }
        self.queue.push_back(outbound);
    }

    /// Start connecting unless a connection, an attempt or a retry is
    /// already underway, or automatic retries are exhausted.
    fn ensure_connecting(&mut self) {
        if self.state() != ConnectionState::Disconnected
            || self.connecting.is_some()
            || self.retry_timer.is_some()
        {
            return;
        }
        if self.exhausted {
            debug!(
                queued = self.queue.len(),
                "Reconnection attempts exhausted, message held until reconnect()"
            );
            return;
        }
        self.begin_connect();
    }

    fn begin_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let endpoint = self.options.endpoint.clone();
        self.connecting = Some(Box::pin(async move { connector.connect(&endpoint).await }));
    }

    fn force_reconnect(&mut self) {
        match self.state() {
            ConnectionState::Open | ConnectionState::Connecting => {
                debug!(state = %self.state(), "Reconnect requested while not disconnected");
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                self.retry_timer = None;
                self.attempts_left = self.options.reconnection_attempts;
                self.exhausted = false;
                info!(endpoint = %self.options.endpoint, "Forced reconnect");
                self.begin_connect();
            }
        }
    }

    async fn on_connected(&mut self, connection: Box<dyn Connection>) {
        info!(
            endpoint = %self.options.endpoint,
            connector = self.connector.name(),
            queued = self.queue.len(),
            "Connected to collector"
        );
        self.connection = Some(connection);
        self.attempts_left = self.options.reconnection_attempts;
        self.exhausted = false;
        self.retry_timer = None;
        self.set_state(ConnectionState::Open);

        while let Some(outbound) = self.queue.pop_front() {
            if !self.write(outbound).await {
                break;
            }
        }
    }

    fn on_connect_failed(&mut self, error: TransportError) {
        self.set_state(ConnectionState::Disconnected);

        // Tracked frames go back to their owners; untracked ones stay queued.
        for mut outbound in std::mem::take(&mut self.queue) {
            match outbound.ack.take() {
                Some(ack) => {
                    let _ = ack.send(Err(error.clone()));
                }
                None => self.queue.push_back(outbound),
            }
        }

        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            self.exhausted = true;
            warn!(
                error = %error,
                queued = self.queue.len(),
                "Connection failed, automatic reconnection attempts exhausted"
            );
            return;
        }

        warn!(
            error = %error,
            attempts_left = self.attempts_left,
            retry_in_ms = self.options.reconnection_timeout.as_millis() as u64,
            "Connection failed, retry scheduled"
        );
        if self.retry_timer.is_none() {
            self.retry_timer = Some(Box::pin(tokio::time::sleep(
                self.options.reconnection_timeout,
            )));
        }
    }

    /// Write one frame. On failure the frame goes back to the front of the
    /// queue, the connection is dropped and reconnection starts.
    async fn write(&mut self, mut outbound: Outbound) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            self.queue.push_front(outbound);
            return false;
        };

        match connection.write(&outbound.frame).await {
            Ok(()) => {
                if let Some(ack) = outbound.ack.take() {
                    let _ = ack.send(Ok(()));
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Write failed, connection dropped");
                self.connection = None;
                self.set_state(ConnectionState::Disconnected);
                self.queue.push_front(outbound);
                self.ensure_connecting();
                false
            }
        }
    }

    async fn close(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.retry_timer = None;

        // One last attempt so frames submitted just before shutdown go out.
        let pending = self.connecting.take();
        if self.connection.is_none() && !self.queue.is_empty() {
            let attempt = match pending {
                Some(pending) => pending.await,
                None => self.connector.connect(&self.options.endpoint).await,
            };
            match attempt {
                Ok(connection) => self.connection = Some(connection),
                Err(e) => debug!(error = %e, "Final connection attempt failed"),
            }
        }

        if self.connection.is_some() {
            while let Some(outbound) = self.queue.pop_front() {
                let Some(connection) = self.connection.as_mut() else {
                    self.queue.push_front(outbound);
                    break;
                };
                if let Err(e) = connection.write(&outbound.frame).await {
                    warn!(error = %e, "Write failed during shutdown");
                    self.queue.push_front(outbound);
                    break;
                }
                if let Some(ack) = outbound.ack {
                    let _ = ack.send(Ok(()));
                }
            }
        }

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!(error = %e, "Error while closing connection");
            }
        }

        let undelivered = self.queue.len();
        for outbound in self.queue.drain(..) {
            if let Some(ack) = outbound.ack {
                let _ = ack.send(Err(TransportError::Closed));
            }
        }
        if undelivered > 0 {
            warn!(undelivered, "Transport closed with undelivered messages");
        }

        self.queued.store(0, Ordering::Relaxed);
        self.set_state(ConnectionState::Disconnected);
        info!("Transport shut down");
    }
}

async fn wait_connect(
    pending: &mut Option<PendingConnect>,
) -> Result<Box<dyn Connection>, TransportError> {
    match pending.as_mut() {
        Some(fut) => {
            let result = fut.await;
            *pending = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn wait_retry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => {
            sleep.as_mut().await;
            *timer = None;
        }
        None => std::future::pending().await,
    }
}
