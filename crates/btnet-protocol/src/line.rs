//! Parsing and integrity validation of inbound device lines.

use crate::checksum::crc16;
use crate::error::ProtocolError;

/// One accepted telemetry sample from a `DATA` line.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSample {
    /// Metric name, appended to the device name in the backend path.
    pub metric: String,
    /// Sample value.
    pub value: f64,
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceLine {
    /// `PING` or `PONG` heartbeat; ignored by the stream loop.
    Heartbeat,
    /// `AT`: the device rejected the last command.
    Rejected,
    /// `DONE`: end of the current streaming response.
    Done,
    /// A validated telemetry sample.
    Data(DataSample),
    /// Anything else; logged and otherwise ignored.
    Other(String),
}

/// Parse one non-empty line from the device.
///
/// Integrity validation only happens when a `DATA` line carries a
/// trailing token (five or more space-separated parts): a 1-2 char
/// token is a decimal length check over the pre-token content, a
/// 4-char token is its hex CRC-16. A line with no token passes
/// unvalidated. Validation failures abort the session.
pub fn parse_line(line: &str) -> Result<DeviceLine, ProtocolError> {
    let parts: Vec<&str> = line.split(' ').collect();
    match parts.as_slice() {
        ["PING"] | ["PONG"] => Ok(DeviceLine::Heartbeat),
        ["AT"] => Ok(DeviceLine::Rejected),
        _ if parts[0] == "DONE" => Ok(DeviceLine::Done),
        _ if parts[0] == "DATA" => parse_data(line, &parts),
        _ => Ok(DeviceLine::Other(line.to_string())),
    }
}

fn parse_data(line: &str, parts: &[&str]) -> Result<DeviceLine, ProtocolError> {
    if parts.len() < 4 {
        return Err(ProtocolError::MalformedData(line.to_string()));
    }
    if parts[3] != "OK" {
        return Ok(DeviceLine::Other(line.to_string()));
    }

    if parts.len() > 4 {
        let token = parts[parts.len() - 1];
        // Content covered by the token: everything before " <token>".
        let base = &line[..line.len() - token.len() - 1];
        match token.len() {
            1 | 2 => {
                let expected: usize = token
                    .parse()
                    .map_err(|_| ProtocolError::BadToken(token.to_string()))?;
                let actual = base.chars().count();
                if actual != expected {
                    return Err(ProtocolError::LengthMismatch { expected, actual });
                }
            }
            4 => {
                let claimed = u16::from_str_radix(token, 16)
                    .map_err(|_| ProtocolError::BadToken(token.to_string()))?;
                let computed = crc16(base);
                if computed != claimed {
                    return Err(ProtocolError::ChecksumMismatch {
                        computed,
                        token: claimed,
                    });
                }
            }
            // Other token lengths carry no check the devices emit.
            _ => {}
        }
    }

    let value: f64 = parts[2]
        .parse()
        .map_err(|_| ProtocolError::BadValue(parts[2].to_string()))?;
    Ok(DeviceLine::Data(DataSample {
        metric: parts[1].to_string(),
        value,
    }))
}
