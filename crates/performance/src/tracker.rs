//! Performance tracker: open transactions, the send queue and the batch
//! ticker.
//!
//! Finished transactions go through the [`SamplingPolicy`]; kept ones wait
//! in the send queue until the next tick drains it as one batch through a
//! [`BatchSender`]. A batch that fails to send goes back to the front of
//! the queue so it is retried before anything newer.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vigil_core::{Clock, SystemClock, TrackerError, TransportError};
use vigil_transport::Transport;

use crate::aggregate::{Aggregate, aggregate};
use crate::model::{Severity, Span, Status, Transaction};
use crate::policy::SamplingPolicy;

// ── Wire message ──────────────────────────────────────────────────────────

pub const CATCHER_TYPE: &str = "performance";

/// One batch as delivered to the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMessage {
    pub token: String,
    pub catcher_type: String,
    pub payload: PerformancePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePayload {
    pub transactions: Vec<Transaction>,
    pub aggregates: Vec<Aggregate>,
}

impl PerformanceMessage {
    pub fn new(token: impl Into<String>, transactions: Vec<Transaction>) -> Self {
        let aggregates = aggregate(&transactions);
        Self {
            token: token.into(),
            catcher_type: CATCHER_TYPE.to_string(),
            payload: PerformancePayload {
                transactions,
                aggregates,
            },
        }
    }
}

/// Where batches go.
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Deliver one batch. An error means the batch was not sent and may be
    /// retried.
    async fn send_batch(&self, message: &PerformanceMessage) -> Result<(), TransportError>;
}

#[async_trait]
impl BatchSender for Transport {
    async fn send_batch(&self, message: &PerformanceMessage) -> Result<(), TransportError> {
        self.deliver(message).await
    }
}

// ── Options ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub token: String,
    pub policy: SamplingPolicy,
    pub batch_interval: Duration,
    /// Log a warning for every span closed by its transaction.
    pub debug: bool,
}

impl TrackerOptions {
    pub fn from_config(config: &vigil_config::VigilConfig) -> Self {
        Self {
            token: config.token.clone().unwrap_or_default(),
            policy: SamplingPolicy::from_config(&config.performance),
            batch_interval: Duration::from_millis(config.performance.batch_interval_ms),
            debug: config.debug,
        }
    }
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self::from_config(&vigil_config::VigilConfig::default())
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    active: HashMap<String, Transaction>,
    /// Ids of `active`, oldest start first.
    started: Vec<String>,
    queue: VecDeque<Transaction>,
    destroyed: bool,
}

struct Core {
    state: Mutex<State>,
    /// Serializes flushes so batches never overlap.
    flush_guard: tokio::sync::Mutex<()>,
    clock: Arc<dyn Clock>,
    sender: Arc<dyn BatchSender>,
    options: TrackerOptions,
}

/// Tracks transactions and sends the interesting ones in periodic batches.
pub struct PerformanceTracker {
    core: Arc<Core>,
    stop_ticker: Mutex<Option<oneshot::Sender<()>>>,
}

impl PerformanceTracker {
    /// Create a tracker and start its batch ticker. Must be called inside a
    /// tokio runtime.
    pub fn new(sender: Arc<dyn BatchSender>, options: TrackerOptions) -> Self {
        Self::with_clock(sender, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        sender: Arc<dyn BatchSender>,
        options: TrackerOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let interval = options.batch_interval.max(Duration::from_millis(1));
        let core = Arc::new(Core {
            state: Mutex::new(State::default()),
            flush_guard: tokio::sync::Mutex::new(()),
            clock,
            sender,
            options,
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run_ticker(Arc::downgrade(&core), interval, stop_rx));

        Self {
            core,
            stop_ticker: Mutex::new(Some(stop_tx)),
        }
    }

    /// Open a transaction.
    pub fn start_transaction(
        &self,
        name: impl Into<String>,
        severity: Severity,
    ) -> Result<TransactionHandle, TrackerError> {
        let mut state = self.core.state.lock();
        if state.destroyed {
            return Err(TrackerError::Destroyed);
        }

        let tx = Transaction::open(name, severity, self.core.clock.now());
        let handle = TransactionHandle {
            id: tx.id.clone(),
            name: tx.name.clone(),
            core: Arc::clone(&self.core),
        };
        state.started.push(tx.id.clone());
        state.active.insert(tx.id.clone(), tx);
        Ok(handle)
    }

    /// Send everything queued as one batch.
    ///
    /// Returns the number of transactions sent. On failure the batch is put
    /// back in front of the queue.
    pub async fn flush(&self) -> Result<usize, TransportError> {
        self.core.flush().await
    }

    /// Close every open transaction in start order, stop the ticker and
    /// send what is left.
    pub async fn destroy(&self) {
        let open: Vec<String> = {
            let mut state = self.core.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.started.clone()
        };

        for id in &open {
            self.core.finish_transaction(id, Status::Success);
        }
        if let Some(stop) = self.stop_ticker.lock().take() {
            let _ = stop.send(());
        }

        match self.core.flush().await {
            Ok(sent) => info!(sent, closed = open.len(), "Performance tracker destroyed"),
            Err(e) => warn!(
                error = %e,
                unsent = self.queued_count(),
                "Final performance flush failed"
            ),
        }
    }

    /// Transactions started and not yet finished.
    pub fn active_count(&self) -> usize {
        self.core.state.lock().active.len()
    }

    /// Finished transactions waiting for the next batch.
    pub fn queued_count(&self) -> usize {
        self.core.state.lock().queue.len()
    }
}

impl Drop for PerformanceTracker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_ticker.lock().take() {
            let _ = stop.send(());
        }
    }
}

async fn run_ticker(core: Weak<Core>, period: Duration, mut stop: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut stop => break,
        }

        let Some(core) = core.upgrade() else {
            break;
        };
        if let Err(e) = core.flush().await {
            debug!(error = %e, "Periodic performance flush failed, batch kept");
        }
    }
    debug!("Performance batch ticker stopped");
}

impl Core {
    /// Open a span, returning its id.
    fn start_span(&self, transaction_id: &str, name: String) -> Result<String, TrackerError> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(TrackerError::Destroyed);
        }
        let now = self.clock.now();
        let tx = state
            .active
            .get_mut(transaction_id)
            .ok_or_else(|| TrackerError::TransactionNotFound(transaction_id.to_string()))?;

        let span = Span::open(transaction_id, name, now);
        let id = span.id.clone();
        tx.spans.push(span);
        Ok(id)
    }

    fn finish_span(&self, transaction_id: &str, span_id: &str, status: Status) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(span) = state
            .active
            .get_mut(transaction_id)
            .and_then(|tx| tx.span_mut(span_id))
        else {
            debug!(span = span_id, "Span already closed with its transaction");
            return;
        };
        span.finish(now, status);
    }

    fn finish_transaction(&self, id: &str, status: Status) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(mut tx) = state.active.remove(id) else {
            debug!(transaction = id, "Transaction already finished");
            return;
        };
        state.started.retain(|started| started != id);

        let auto_finished = tx.finish(now, status);
        if self.options.debug {
            for span in &auto_finished {
                warn!(
                    transaction = %tx.name,
                    span = %span,
                    "Span was still open when its transaction finished, closed automatically"
                );
            }
        }

        let decision = self.options.policy.decide(&tx);
        if decision.keep() {
            debug!(transaction = %tx.name, duration_ms = tx.duration_ms(), %decision, "Transaction queued");
            state.queue.push_back(tx);
        } else {
            debug!(transaction = %tx.name, duration_ms = tx.duration_ms(), %decision, "Transaction dropped");
        }
    }

    async fn flush(&self) -> Result<usize, TransportError> {
        let _guard = self.flush_guard.lock().await;

        let batch: Vec<Transaction> = self.state.lock().queue.drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let sent = batch.len();
        let message = PerformanceMessage::new(self.options.token.clone(), batch);
        match self.sender.send_batch(&message).await {
            Ok(()) => {
                debug!(sent, "Performance batch sent");
                Ok(sent)
            }
            Err(e) => {
                warn!(error = %e, count = sent, "Performance batch failed, requeued");
                let mut state = self.state.lock();
                for tx in message.payload.transactions.into_iter().rev() {
                    state.queue.push_front(tx);
                }
                Err(e)
            }
        }
    }
}

// ── Handles ───────────────────────────────────────────────────────────────

/// An open transaction.
///
/// Clones refer to the same transaction. Finishing more than once is a
/// no-op.
#[derive(Clone)]
pub struct TransactionHandle {
    id: String,
    name: String,
    core: Arc<Core>,
}

impl TransactionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_span(&self, name: impl Into<String>) -> Result<SpanHandle, TrackerError> {
        let id = self.core.start_span(&self.id, name.into())?;
        Ok(SpanHandle {
            id,
            transaction_id: self.id.clone(),
            core: Arc::clone(&self.core),
        })
    }

    pub fn finish(&self, status: Status) {
        self.core.finish_transaction(&self.id, status);
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// An open span within a transaction.
pub struct SpanHandle {
    id: String,
    transaction_id: String,
    core: Arc<Core>,
}

impl SpanHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Close the span. Does nothing if it, or its transaction, is already
    /// finished.
    pub fn finish(&self, status: Status) {
        self.core
            .finish_span(&self.transaction_id, &self.id, status);
    }
}
