//! Carbon plaintext metrics backend.
//!
//! Carbon's line receiver takes `<path> <value> <unix-seconds>\n`. Each
//! worker holds its own connection and reconnects lazily at the start of
//! the next cycle after a failure.

use std::io::Write;
use std::net::TcpStream;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::transport::TransportError;

/// A connected metrics sink.
pub trait MetricsSink: Send {
    /// Send one metric line (without the trailing newline).
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;
}

/// Opens metrics sinks; shared by all workers.
pub trait SinkFactory: Send + Sync {
    /// Connect to the backend at `address`.
    fn connect(&self, address: &str) -> Result<Box<dyn MetricsSink>, TransportError>;
}

/// Carbon plaintext client over TCP.
pub struct CarbonClient {
    stream: TcpStream,
}

impl CarbonClient {
    /// Dial the Carbon line receiver at `address` (`host:port`).
    pub fn connect(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).map_err(|source| TransportError::Connect {
            addr: address.to_string(),
            source,
        })?;
        Ok(CarbonClient { stream })
    }
}

impl MetricsSink for CarbonClient {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }
}

/// Production sink factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct CarbonFactory;

impl SinkFactory for CarbonFactory {
    fn connect(&self, address: &str) -> Result<Box<dyn MetricsSink>, TransportError> {
        Ok(Box::new(CarbonClient::connect(address)?))
    }
}

/// Current wall-clock time as Unix seconds, for metric timestamps.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
