// In: src/source.rs

//! The self-describing digit input container: reader for the converter and
//! writer for upstream simulators and tests. This module is the single source
//! of truth for serialization and deserialization of digit streams.
//!
//! Layout (all little-endian):
//!   magic  b"DGTS" (4)
//!   u16    container format version
//!   u32    record count
//!   records, each:
//!     u64  timestamp (bunch-crossing clock ticks)
//!     u16  module
//!     u8   side
//!     u8   reserved (zero)
//!     u16  payload word count
//!     u32 * count  payload words
//!
//! Records must be non-decreasing in timestamp; a regression marks a corrupt
//! producer and is rejected rather than silently reordered.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::RawError;
use crate::format::{DIGIT_FORMAT_VERSION, DIGIT_MAGIC, MAX_DIGIT_WORDS};
use crate::types::Digit;

/// The minimum possible size of a valid digit container in bytes.
const MIN_CONTAINER_SIZE: usize = 10; // magic(4) + ver(2) + count(4)
/// Fixed bytes per record before its payload words.
const RECORD_PREFIX_SIZE: usize = 14; // ts(8) + module(2) + side(1) + rsvd(1) + words(2)

//==================================================================================
// Public API
//==================================================================================

/// Reads and decodes a digit container file.
pub fn read_digit_file(path: &Path) -> Result<Vec<Digit>, RawError> {
    let bytes = fs::read(path)?;
    decode_digits(&bytes)
}

/// Decodes a digit container from memory.
pub fn decode_digits(bytes: &[u8]) -> Result<Vec<Digit>, RawError> {
    if bytes.len() < MIN_CONTAINER_SIZE {
        return Err(RawError::DigitFormat(format!(
            "Container is too small to be valid. Minimum size: {}, got: {}",
            MIN_CONTAINER_SIZE,
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let map_err = |e: std::io::Error| RawError::DigitFormat(e.to_string());

    let mut magic_buf = [0u8; 4];
    cursor.read_exact(&mut magic_buf).map_err(map_err)?;
    if magic_buf != *DIGIT_MAGIC {
        return Err(RawError::DigitFormat("Invalid digit magic number".into()));
    }

    let mut u16_buf = [0u8; 2];
    cursor.read_exact(&mut u16_buf).map_err(map_err)?;
    let version = u16::from_le_bytes(u16_buf);
    if version != DIGIT_FORMAT_VERSION {
        return Err(RawError::DigitFormat(format!(
            "Unsupported digit container version: expected {}, got {}",
            DIGIT_FORMAT_VERSION, version
        )));
    }

    let mut u32_buf = [0u8; 4];
    cursor.read_exact(&mut u32_buf).map_err(map_err)?;
    let count = u32::from_le_bytes(u32_buf) as usize;

    let mut digits = Vec::with_capacity(count.min(1 << 20));
    let mut last_timestamp: u64 = 0;

    for i in 0..count {
        let mut u64_buf = [0u8; 8];
        cursor.read_exact(&mut u64_buf).map_err(map_err)?;
        let timestamp = u64::from_le_bytes(u64_buf);

        if timestamp < last_timestamp {
            return Err(RawError::DigitFormat(format!(
                "Record {}: timestamp {} regresses below {}; the stream must be time-ordered",
                i, timestamp, last_timestamp
            )));
        }
        last_timestamp = timestamp;

        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let module = u16::from_le_bytes(u16_buf);
        let mut byte_buf = [0u8; 2];
        cursor.read_exact(&mut byte_buf).map_err(map_err)?;
        let side = byte_buf[0];

        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let num_words = u16::from_le_bytes(u16_buf) as usize;

        // SECURITY: validate the declared payload length against both a sane
        // maximum and the remaining buffer before allocating.
        if num_words > MAX_DIGIT_WORDS {
            return Err(RawError::DigitFormat(format!(
                "Record {}: payload of {} words exceeds maximum {}",
                i, num_words, MAX_DIGIT_WORDS
            )));
        }
        let payload_len = num_words * std::mem::size_of::<u32>();
        let start = cursor.position() as usize;
        if start + payload_len > bytes.len() {
            return Err(RawError::DigitFormat(format!(
                "Record {}: declared payload exceeds buffer size",
                i
            )));
        }

        // pod_collect_to_vec copies, so alignment of the source slice is irrelevant.
        let payload: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[start..start + payload_len]);
        cursor.set_position((start + payload_len) as u64);

        digits.push(Digit {
            timestamp,
            module,
            side,
            payload,
        });
    }

    if (cursor.position() as usize) != bytes.len() {
        return Err(RawError::DigitFormat(
            "Did not consume entire input buffer. Trailing bytes detected.".to_string(),
        ));
    }

    Ok(digits)
}

/// Serializes digits into the canonical container form.
/// This is the authoritative writer for the digit format, used by upstream
/// producers and by the test suite.
pub fn encode_digits(digits: &[Digit]) -> Result<Vec<u8>, RawError> {
    let payload_total: usize = digits.iter().map(Digit::payload_bytes).sum();
    let mut buf =
        Vec::with_capacity(MIN_CONTAINER_SIZE + digits.len() * RECORD_PREFIX_SIZE + payload_total);

    buf.extend_from_slice(DIGIT_MAGIC);
    buf.extend_from_slice(&DIGIT_FORMAT_VERSION.to_le_bytes());
    let count = u32::try_from(digits.len())
        .map_err(|_| RawError::DigitFormat("Too many records for a u32 count".into()))?;
    buf.extend_from_slice(&count.to_le_bytes());

    for digit in digits {
        if digit.payload.len() > MAX_DIGIT_WORDS {
            return Err(RawError::DigitFormat(format!(
                "Digit payload of {} words exceeds maximum {}",
                digit.payload.len(),
                MAX_DIGIT_WORDS
            )));
        }
        buf.extend_from_slice(&digit.timestamp.to_le_bytes());
        buf.extend_from_slice(&digit.module.to_le_bytes());
        buf.push(digit.side);
        buf.push(0); // reserved
        buf.extend_from_slice(&(digit.payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(bytemuck::cast_slice(&digit.payload));
    }

    Ok(buf)
}

/// Writes digits to a container file.
pub fn write_digit_file(path: &Path, digits: &[Digit]) -> Result<(), RawError> {
    let bytes = encode_digits(digits)?;
    fs::write(path, bytes)?;
    Ok(())
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_digits() -> Vec<Digit> {
        vec![
            Digit {
                timestamp: 0,
                module: 0,
                side: 0,
                payload: vec![0xCAFE_0001, 0xCAFE_0002],
            },
            Digit {
                timestamp: 7,
                module: 12,
                side: 1,
                payload: vec![],
            },
            Digit {
                timestamp: 7,
                module: 539,
                side: 0,
                payload: vec![0xFFFF_FFFF],
            },
        ]
    }

    #[test]
    fn test_container_roundtrip_is_successful() {
        let original = sample_digits();
        let bytes = encode_digits(&original).unwrap();
        let decoded = decode_digits(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_time_regression_is_rejected() {
        let mut digits = sample_digits();
        digits[2].timestamp = 3; // below the previous record's 7
        let bytes = encode_digits(&digits).unwrap();
        assert!(matches!(
            decode_digits(&bytes),
            Err(RawError::DigitFormat(_))
        ));
    }

    #[test]
    fn test_parsing_errors_are_handled_gracefully() {
        // Too short.
        assert!(matches!(
            decode_digits(b"short"),
            Err(RawError::DigitFormat(_))
        ));

        // Bad magic.
        let mut bytes = encode_digits(&sample_digits()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_digits(&bytes),
            Err(RawError::DigitFormat(_))
        ));

        // Bad version.
        let mut bytes = encode_digits(&sample_digits()).unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;
        assert!(matches!(
            decode_digits(&bytes),
            Err(RawError::DigitFormat(_))
        ));

        // Truncated payload.
        let bytes = encode_digits(&sample_digits()).unwrap();
        assert!(matches!(
            decode_digits(&bytes[..bytes.len() - 1]),
            Err(RawError::DigitFormat(_))
        ));

        // Trailing garbage.
        let mut bytes = encode_digits(&sample_digits()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_digits(&bytes),
            Err(RawError::DigitFormat(_))
        ));
    }

    #[test]
    fn test_declared_length_exceeding_buffer_is_rejected() {
        let mut bytes = encode_digits(&sample_digits()).unwrap();
        // Corrupt the first record's word count to a huge value.
        let word_count_off = MIN_CONTAINER_SIZE + RECORD_PREFIX_SIZE - 2;
        bytes[word_count_off] = 0xFF;
        bytes[word_count_off + 1] = 0x00;
        assert!(matches!(
            decode_digits(&bytes),
            Err(RawError::DigitFormat(_))
        ));
    }
}
