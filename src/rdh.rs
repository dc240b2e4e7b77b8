// In: src/rdh.rs

//! The versioned Raw Data Header (RDH) codec.
//!
//! This module is the authoritative writer and reader for the byte-exact
//! header prefix stamped on every frame. It is the only place in the crate
//! that knows field offsets: the layout is pluggable behind `RdhVersion`, and
//! everything else treats a header as an opaque fixed-size prefix.
//!
//! Two layouts are supported. They share their leading fields and differ in
//! the width of the timing counters:
//!
//! V4 (48 bytes):                         V6 (64 bytes):
//!   u8  version (= 4)                      u8  version (= 6)
//!   u8  header_size (= 48)                 u8  header_size (= 64)
//!   u16 link id                            u16 link id
//!   u32 memory_size (payload bytes)        u32 memory_size (payload bytes)
//!   u32 offset_to_next                     u32 offset_to_next
//!   u32 orbit                              u64 orbit
//!   u16 bunch_crossing                     u16 bunch_crossing
//!   u16 flags                              u16 flags
//!   u32 trigger_type                       u32 trigger_type
//!   u32 frame_seq                          u64 frame_seq
//!   zero padding to 48                     zero padding to 64
//!
//! All fields are little-endian. The readout mode selects which timing fields
//! are populated (heartbeat clock vs. trigger word), never the length.

use std::io::{Cursor, Read};

use crate::config::RdhVersion;
use crate::error::RawError;
use crate::types::LinkId;

//==================================================================================
// Format Constants
//==================================================================================

/// Encoded size of a V4 header in bytes.
pub const RDH_V4_SIZE: usize = 48;
/// Encoded size of a V6 header in bytes.
pub const RDH_V6_SIZE: usize = 64;

/// Flag bit: the run uses continuous (heartbeat-clocked) readout.
pub const FLAG_CONTINUOUS: u16 = 1 << 0;
/// Flag bit: this is the closing frame of its heartbeat window.
pub const FLAG_STOP: u16 = 1 << 1;
/// Flag bit: the frame carries no payload.
pub const FLAG_EMPTY: u16 = 1 << 2;

//==================================================================================
// Public Structs
//==================================================================================

/// An in-memory Raw Data Header, the source for encoding and the target for
/// decoding. Field semantics are identical across layout versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rdh {
    pub version: RdhVersion,
    pub link: LinkId,
    /// Payload bytes following this header.
    pub memory_size: u32,
    /// Heartbeat orbit counter. Populated in continuous readout, zero otherwise.
    pub orbit: u64,
    /// Bunch crossing within the orbit. Populated in continuous readout.
    pub bunch_crossing: u16,
    pub flags: u16,
    /// Trigger word. Populated in triggered readout, zero otherwise.
    pub trigger_type: u32,
    /// Per-link frame sequence counter.
    pub frame_seq: u64,
}

impl Rdh {
    /// The fixed encoded size of this header, in bytes.
    pub fn header_size(&self) -> usize {
        self.version.header_size()
    }

    /// Offset from the start of this header to the start of the next one.
    pub fn offset_to_next(&self) -> u32 {
        self.header_size() as u32 + self.memory_size
    }

    pub fn is_empty(&self) -> bool {
        self.flags & FLAG_EMPTY != 0
    }

    pub fn is_stop(&self) -> bool {
        self.flags & FLAG_STOP != 0
    }

    /// Serializes the header into its canonical, byte-exact form.
    ///
    /// V4's narrow counters reject values that do not fit rather than
    /// truncating them; overflow of the 32-bit orbit counter means the run
    /// outlived the layout and must be encoded with V6.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RawError> {
        let size = self.header_size();
        let mut buf = Vec::with_capacity(size);

        match self.version {
            RdhVersion::V4 => {
                buf.push(4u8);
                buf.push(RDH_V4_SIZE as u8);
                buf.extend_from_slice(&self.link.value().to_le_bytes());
                buf.extend_from_slice(&self.memory_size.to_le_bytes());
                buf.extend_from_slice(&self.offset_to_next().to_le_bytes());
                let orbit32 = u32::try_from(self.orbit).map_err(|_| {
                    RawError::HeaderFormat(format!(
                        "orbit {} does not fit the 32-bit V4 counter",
                        self.orbit
                    ))
                })?;
                buf.extend_from_slice(&orbit32.to_le_bytes());
                buf.extend_from_slice(&self.bunch_crossing.to_le_bytes());
                buf.extend_from_slice(&self.flags.to_le_bytes());
                buf.extend_from_slice(&self.trigger_type.to_le_bytes());
                let seq32 = u32::try_from(self.frame_seq).map_err(|_| {
                    RawError::HeaderFormat(format!(
                        "frame_seq {} does not fit the 32-bit V4 counter",
                        self.frame_seq
                    ))
                })?;
                buf.extend_from_slice(&seq32.to_le_bytes());
            }
            RdhVersion::V6 => {
                buf.push(6u8);
                buf.push(RDH_V6_SIZE as u8);
                buf.extend_from_slice(&self.link.value().to_le_bytes());
                buf.extend_from_slice(&self.memory_size.to_le_bytes());
                buf.extend_from_slice(&self.offset_to_next().to_le_bytes());
                buf.extend_from_slice(&self.orbit.to_le_bytes());
                buf.extend_from_slice(&self.bunch_crossing.to_le_bytes());
                buf.extend_from_slice(&self.flags.to_le_bytes());
                buf.extend_from_slice(&self.trigger_type.to_le_bytes());
                buf.extend_from_slice(&self.frame_seq.to_le_bytes());
            }
        }

        // Zero-pad to the layout's fixed size.
        buf.resize(size, 0);
        Ok(buf)
    }

    /// Deserializes a header from the start of `bytes`.
    ///
    /// The version byte selects the layout; an unknown version or a
    /// header_size byte that contradicts it is a format error, as is a buffer
    /// shorter than the declared header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RawError> {
        if bytes.len() < 2 {
            return Err(RawError::HeaderFormat(
                "Buffer too small to hold an RDH version byte".into(),
            ));
        }

        let version = match bytes[0] {
            4 => RdhVersion::V4,
            6 => RdhVersion::V6,
            other => {
                return Err(RawError::HeaderFormat(format!(
                    "Unknown RDH version byte: {}",
                    other
                )))
            }
        };
        let size = version.header_size();
        if bytes[1] as usize != size {
            return Err(RawError::HeaderFormat(format!(
                "RDH v{:?} declares header size {}, expected {}",
                version, bytes[1], size
            )));
        }
        if bytes.len() < size {
            return Err(RawError::HeaderFormat(format!(
                "Truncated RDH: need {} bytes, got {}",
                size,
                bytes.len()
            )));
        }

        let map_err = |e: std::io::Error| RawError::HeaderFormat(e.to_string());
        let mut cursor = Cursor::new(&bytes[2..size]);

        let mut u16_buf = [0u8; 2];
        let mut u32_buf = [0u8; 4];
        let mut u64_buf = [0u8; 8];

        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let link = LinkId(u16::from_le_bytes(u16_buf));
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let memory_size = u32::from_le_bytes(u32_buf);
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let offset_to_next = u32::from_le_bytes(u32_buf);

        let orbit = match version {
            RdhVersion::V4 => {
                cursor.read_exact(&mut u32_buf).map_err(map_err)?;
                u32::from_le_bytes(u32_buf) as u64
            }
            RdhVersion::V6 => {
                cursor.read_exact(&mut u64_buf).map_err(map_err)?;
                u64::from_le_bytes(u64_buf)
            }
        };

        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let bunch_crossing = u16::from_le_bytes(u16_buf);
        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let flags = u16::from_le_bytes(u16_buf);
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let trigger_type = u32::from_le_bytes(u32_buf);

        let frame_seq = match version {
            RdhVersion::V4 => {
                cursor.read_exact(&mut u32_buf).map_err(map_err)?;
                u32::from_le_bytes(u32_buf) as u64
            }
            RdhVersion::V6 => {
                cursor.read_exact(&mut u64_buf).map_err(map_err)?;
                u64::from_le_bytes(u64_buf)
            }
        };

        let rdh = Rdh {
            version,
            link,
            memory_size,
            orbit,
            bunch_crossing,
            flags,
            trigger_type,
            frame_seq,
        };

        // Cross-check the stored offset against the derived one.
        if offset_to_next != rdh.offset_to_next() {
            return Err(RawError::HeaderFormat(format!(
                "RDH offset_to_next {} contradicts header_size + memory_size {}",
                offset_to_next,
                rdh.offset_to_next()
            )));
        }

        Ok(rdh)
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
