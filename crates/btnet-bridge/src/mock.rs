//! Scripted test doubles for the device link and the metrics sink.
//!
//! A [`ScriptedLink`] replays a fixed sequence of read outcomes and
//! records every line written to it, which makes worker cycles fully
//! deterministic under test. Not compiled into release binaries beyond
//! what the linker strips; kept in the library so integration tests can
//! drive [`crate::worker::DeviceWorker`] end to end.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::carbon::{MetricsSink, SinkFactory};
use crate::transport::{DeviceLink, LinkFactory, LinkWriter, TransportError};

/// One scripted read outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes delivered by the link, in order.
    Bytes(Vec<u8>),
    /// A quiet gap on the link before the next step.
    Wait(Duration),
    /// The read timeout expires.
    Timeout,
    /// The peer closes the link.
    Close,
}

impl Step {
    /// Convenience for a full line including the terminating newline.
    pub fn line(text: &str) -> Step {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        Step::Bytes(bytes)
    }
}

/// Device link replaying a script; records everything sent to it.
pub struct ScriptedLink {
    steps: VecDeque<Step>,
    pending: VecDeque<u8>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLink {
    /// Build a link from `steps`, returning the shared log of sent
    /// lines alongside it.
    pub fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let link = ScriptedLink {
            steps: steps.into(),
            pending: VecDeque::new(),
            sent: Arc::clone(&sent),
        };
        (link, sent)
    }
}

impl LinkWriter for ScriptedLink {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.lock().push(line.to_string());
        Ok(())
    }
}

impl DeviceLink for ScriptedLink {
    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(Some(byte));
            }
            match self.steps.pop_front() {
                Some(Step::Bytes(bytes)) => self.pending.extend(bytes),
                Some(Step::Wait(gap)) => std::thread::sleep(gap),
                Some(Step::Timeout) => return Err(TransportError::Timeout),
                // Script exhausted reads like a closed link.
                Some(Step::Close) | None => return Ok(None),
            }
        }
    }

    fn writer(&self) -> Result<Box<dyn LinkWriter>, TransportError> {
        Ok(Box::new(SharedWriter {
            sent: Arc::clone(&self.sent),
        }))
    }
}

/// Standalone write handle logging into a shared vector.
pub struct SharedWriter {
    sent: Arc<Mutex<Vec<String>>>,
}

impl SharedWriter {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let writer = SharedWriter {
            sent: Arc::clone(&sent),
        };
        (writer, sent)
    }
}

impl LinkWriter for SharedWriter {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.lock().push(line.to_string());
        Ok(())
    }
}

/// Hands out pre-scripted links, one per `connect` call, in order.
/// Further connects fail, which reads as an unreachable device.
pub struct ScriptedLinkFactory {
    sessions: Mutex<VecDeque<ScriptedLink>>,
}

impl ScriptedLinkFactory {
    pub fn new(sessions: Vec<ScriptedLink>) -> Self {
        ScriptedLinkFactory {
            sessions: Mutex::new(sessions.into()),
        }
    }
}

impl LinkFactory for ScriptedLinkFactory {
    fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, TransportError> {
        match self.sessions.lock().pop_front() {
            Some(link) => Ok(Box::new(link)),
            None => Err(TransportError::Connect {
                addr: address.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "no scripted session"),
            }),
        }
    }
}

/// Metrics sink collecting lines in memory.
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MetricsSink for MemorySink {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Factory whose sinks all share one in-memory line log.
#[derive(Default)]
pub struct MemorySinkFactory {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared log of every line any connected sink received.
    pub fn lines(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.lines)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn connect(&self, _address: &str) -> Result<Box<dyn MetricsSink>, TransportError> {
        Ok(Box::new(MemorySink {
            lines: Arc::clone(&self.lines),
        }))
    }
}
