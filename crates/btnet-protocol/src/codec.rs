//! Incremental byte-to-line assembly for the device stream.
//!
//! Devices talk newline-terminated ASCII, but the wireless link injects
//! garbage bytes when the radio desynchronizes. Any byte outside the
//! printable range (and not a newline) therefore discards the partial
//! line and restarts accumulation, which keeps the stream parseable
//! across transient line noise.

use bytes::BytesMut;

/// Result of feeding one byte to a [`LineAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// The byte was accumulated; no complete line yet.
    Pending,
    /// A non-printable byte arrived; the partial buffer was discarded.
    Desync(String),
    /// A newline completed this line (trailing whitespace stripped).
    /// May be empty; callers skip empty lines.
    Line(String),
}

/// Accumulates a byte stream into protocol lines, one byte at a time.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: BytesMut,
}

impl LineAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        LineAssembler {
            buffer: BytesMut::with_capacity(128),
        }
    }

    /// Feed one received byte.
    pub fn push(&mut self, byte: u8) -> LineEvent {
        if byte == b'\n' {
            let line = String::from_utf8_lossy(&self.buffer)
                .trim_end()
                .to_string();
            self.buffer.clear();
            return LineEvent::Line(line);
        }
        if !(32..=127).contains(&byte) {
            let discarded = String::from_utf8_lossy(&self.buffer).to_string();
            self.buffer.clear();
            return LineEvent::Desync(discarded);
        }
        self.buffer.extend_from_slice(&[byte]);
        LineEvent::Pending
    }
}
