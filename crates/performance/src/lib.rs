//! # Vigil Performance
//!
//! Transactions and spans with a finish-time sampling policy and periodic,
//! batched delivery.
//!
//! ```text
//! start_transaction ─► start_span ─► finish ─► SamplingPolicy ─► send queue
//!                                                                   │ every batch_interval
//!                                                                   ▼
//!                                                      BatchSender (Transport)
//! ```

pub mod aggregate;
pub mod model;
pub mod policy;
pub mod tracker;

pub use aggregate::Aggregate;
pub use model::{Severity, Span, Status, Transaction};
pub use policy::{Decision, SamplingPolicy};
pub use tracker::{
    BatchSender, PerformanceMessage, PerformancePayload, PerformanceTracker, SpanHandle,
    TrackerOptions, TransactionHandle,
};
