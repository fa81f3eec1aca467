//! Connector trait, the abstraction over the wire to the collector.
//!
//! A [`Connector`] opens a [`Connection`] to an endpoint; the connection
//! writes already-serialized frames. The transport never looks past these
//! two traits, so a host can swap the TCP implementation for a WebSocket,
//! a Unix socket or an in-memory fake.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;
use vigil_core::TransportError;

/// Opens connections to a collector endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable name (e.g. "tcp").
    fn name(&self) -> &str;

    /// Establish a new connection.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// An open connection that accepts frames in order.
#[async_trait]
pub trait Connection: Send {
    /// Write one frame. Returns once the frame has been handed to the OS.
    async fn write(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(()) // No-op default
    }
}

/// Newline-delimited JSON over TCP.
///
/// Accepts `host:port` or `tcp://host:port` endpoints.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        let addr = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
        let failed = |reason: String| TransportError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason,
        };

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                failed(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| failed(e.to_string()))?;

        stream.set_nodelay(true).map_err(|e| failed(e.to_string()))?;
        debug!(endpoint = %endpoint, "TCP connection established");

        Ok(Box::new(TcpConnection {
            stream: BufWriter::new(stream),
        }))
    }
}

struct TcpConnection {
    stream: BufWriter<TcpStream>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn write(&mut self, frame: &str) -> Result<(), TransportError> {
        let io = |e: std::io::Error| TransportError::WriteFailed(e.to_string());
        self.stream.write_all(frame.as_bytes()).await.map_err(io)?;
        self.stream.write_all(b"\n").await.map_err(io)?;
        self.stream.flush().await.map_err(io)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_frames_are_newline_delimited() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let reader = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            let mut out = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                out.push(line);
            }
            out
        });

        let connector = TcpConnector::default();
        let mut conn = connector
            .connect(&format!("tcp://{addr}"))
            .await
            .unwrap();
        conn.write(r#"{"n":1}"#).await.unwrap();
        conn.write(r#"{"n":2}"#).await.unwrap();
        conn.close().await.unwrap();

        let lines = reader.await.unwrap();
        assert_eq!(lines, vec![r#"{"n":1}"#, r#"{"n":2}"#]);
    }

    #[tokio::test]
    async fn refused_connection_is_connection_failed() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let connector = TcpConnector::default();
        match connector.connect(&addr.to_string()).await {
            Err(TransportError::ConnectionFailed { endpoint, .. }) => {
                assert_eq!(endpoint, addr.to_string());
            }
            Err(other) => panic!("Expected ConnectionFailed, got: {other:?}"),
            Ok(_) => panic!("Expected ConnectionFailed, got a connection"),
        }
    }
}
