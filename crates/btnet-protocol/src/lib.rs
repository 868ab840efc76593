//! btnet sensor wire protocol
//!
//! This crate provides the line-oriented text protocol spoken by the
//! battery-powered wireless sensor devices, independent of any transport.
//!
//! # Protocol Overview
//!
//! The protocol is newline-terminated ASCII in both directions:
//!
//! - **Commands** (bridge → device): `PING`, `READ`, `FEED <seconds>`,
//!   `RESET`, `SLEEP <seconds>`, `OK`
//! - **Lines** (device → bridge): `PING`, `PONG`, `AT`, `DONE`,
//!   `DATA <metric> <value> OK [<token>]`
//!
//! Telemetry lines may carry a trailing integrity token: a 1-2 digit
//! decimal length of the preceding line content, or a 4-hex-digit
//! CRC-16/Modbus over it. The wireless link occasionally injects garbage
//! bytes, so the byte-level framing treats any non-printable byte as a
//! frame desynchronization and restarts line accumulation.
//!
//! # Example
//!
//! ```rust
//! use btnet_protocol::{parse_line, DeviceLine, LineAssembler, LineEvent};
//!
//! let mut assembler = LineAssembler::new();
//! let mut line = None;
//! for &byte in b"DATA temp 23.5 OK\n" {
//!     if let LineEvent::Line(l) = assembler.push(byte) {
//!         line = Some(l);
//!     }
//! }
//! let parsed = parse_line(&line.unwrap()).unwrap();
//! assert!(matches!(parsed, DeviceLine::Data(_)));
//! ```

mod checksum;
mod codec;
mod error;
mod line;

pub use checksum::crc16;
pub use codec::{LineAssembler, LineEvent};
pub use error::ProtocolError;
pub use line::{parse_line, DataSample, DeviceLine};
