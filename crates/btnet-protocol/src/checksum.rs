//! CRC-16 integrity checksum for DATA lines.
//!
//! The device firmware appends a 4-hex-digit CRC-16/Modbus to its
//! telemetry lines. This is the table-free variant (seed 0xFFFF,
//! reflected polynomial 0xA001) and must match the firmware bit for bit.

/// Reflected CRC-16/Modbus polynomial.
const POLY: u16 = 0xA001;

/// Compute the CRC-16/Modbus checksum over the bytes of `payload`.
pub fn crc16(payload: &str) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in payload.as_bytes() {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_check_value() {
        // Standard check value for CRC-16/Modbus.
        assert_eq!(crc16("123456789"), 0x4B37);
    }

    #[test]
    fn test_empty_payload_is_seed() {
        assert_eq!(crc16(""), 0xFFFF);
    }

    #[test]
    fn test_data_line_vectors() {
        assert_eq!(crc16("DATA temp 23.5 OK"), 0xFFB7);
        assert_eq!(crc16("DATA hum 55.1 OK"), 0xD8E3);
        assert_eq!(crc16("DATA volt 3.71 OK"), 0x5A03);
    }

    #[test]
    fn test_corruption_changes_checksum() {
        assert_ne!(crc16("DATA temp 23.5 OK"), crc16("DATA temp 23.4 OK"));
        assert_ne!(crc16("DATA temp 23.5 OK"), crc16("DATA temp 23.5 Ok"));
    }
}
