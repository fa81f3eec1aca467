//! # Vigil Transport
//!
//! Delivery of serialized messages to the collector over a persistent
//! connection. Messages submitted while the connection is down are queued
//! and flushed in submission order once it comes back.

pub mod connection;
pub mod transport;

pub use connection::{Connection, Connector, TcpConnector};
pub use transport::{ConnectionState, Transport, TransportOptions};
