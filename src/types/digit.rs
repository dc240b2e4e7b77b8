// In: src/types/digit.rs

//! The canonical digit record and link addressing types.
//!
//! A `Digit` is one timestamped detector hit as produced by the upstream
//! simulator. It is immutable once decoded from the input container and is
//! owned by the frame builder only for the duration of framing.

use serde::{Deserialize, Serialize};

/// Number of detector modules with valid addressing.
pub const MAX_MODULES: u16 = 540;
/// Each module has two half-chamber sides, A (0) and B (1).
pub const SIDES_PER_MODULE: u8 = 2;

/// Identifies one physical output link (half-chamber data link).
///
/// Link ids are derived deterministically from detector addressing and are
/// referentially stable for the lifetime of a run: the same `(module, side)`
/// always yields the same `LinkId`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub u16);

impl LinkId {
    /// Total number of addressable links.
    pub const COUNT: u16 = MAX_MODULES * SIDES_PER_MODULE as u16;

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link{:04}", self.0)
    }
}

/// A single timestamped detector hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digit {
    /// Arrival time in bunch-crossing clock ticks since start of run.
    pub timestamp: u64,
    /// Detector module index, valid range `0..MAX_MODULES`.
    pub module: u16,
    /// Half-chamber side within the module, valid range `0..SIDES_PER_MODULE`.
    pub side: u8,
    /// Raw data words produced by the front-end, serialized little-endian.
    pub payload: Vec<u32>,
}

impl Digit {
    /// The encoded payload size in bytes once framed.
    pub fn payload_bytes(&self) -> usize {
        self.payload.len() * std::mem::size_of::<u32>()
    }
}
