//! Wireless device link abstraction.
//!
//! The bridge treats the short-range wireless transport as a blocking
//! byte-stream socket with an explicit read timeout. The production
//! implementation connects over TCP to the serial bridge address from
//! the device config; tests use the scripted link in [`crate::mock`].

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;

/// Errors from the wireless link or the metrics backend connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a connection.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A read exceeded the configured timeout.
    #[error("read timed out")]
    Timeout,

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write half of a device link. Registry handles and control sessions
/// only ever need this.
pub trait LinkWriter: Send {
    /// Send one newline-terminated command line.
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;
}

/// A connected wireless device link.
pub trait DeviceLink: LinkWriter {
    /// Apply the per-read timeout for the whole session.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Read a single byte. `Ok(None)` means the peer closed the link;
    /// an expired read timeout is `Err(TransportError::Timeout)`.
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;

    /// An independent write handle, suitable for publishing into the
    /// device registry while the worker keeps reading.
    fn writer(&self) -> Result<Box<dyn LinkWriter>, TransportError>;
}

/// Opens device links; one factory is shared by all workers.
pub trait LinkFactory: Send + Sync {
    /// Connect to the device at `address`.
    fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, TransportError>;
}

/// TCP-backed device link (the wireless serial bridge is exposed as a
/// `host:port` byte stream).
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Dial `address` (`host:port`).
    pub fn connect(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).map_err(|source| TransportError::Connect {
            addr: address.to_string(),
            source,
        })?;
        Ok(TcpLink { stream })
    }
}

impl LinkWriter for TcpLink {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }
}

impl DeviceLink for TcpLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn writer(&self) -> Result<Box<dyn LinkWriter>, TransportError> {
        let stream = self.stream.try_clone()?;
        Ok(Box::new(TcpLink { stream }))
    }
}

/// Production link factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpLinkFactory;

impl LinkFactory for TcpLinkFactory {
    fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, TransportError> {
        Ok(Box::new(TcpLink::connect(address)?))
    }
}
