//! Error types for the Vigil domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Most background
//! failures never reach a caller: they are recovered and logged where they
//! happen. The variants here are what the public operations can return.

use thiserror::Error;

/// The top-level error type for all Vigil operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Performance tracker errors ---
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    // --- Event filtering ---
    #[error("Event rejected by before_send filter")]
    EventRejected,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Message could not be serialized: {0}")]
    Serialization(String),

    #[error("Transport is shut down")]
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Performance tracker has been destroyed")]
    Destroyed,
}
