// In: src/format.rs

//! Defines all on-disk structures and constants for the digit2raw formats.
//! This is the single source of truth for the digit input container and for
//! the run manifest written after every successful conversion. The RDH byte
//! layouts themselves live in `rdh` and nowhere else.

use serde::{Deserialize, Serialize};

use crate::config::{FileGrouping, RdhVersion, ReadoutMode};

//==================================================================================
// I. Digit Input Container
//==================================================================================

/// The magic number identifying a digit input file.
pub const DIGIT_MAGIC: &[u8; 4] = b"DGTS";
/// The current version of the digit container format.
pub const DIGIT_FORMAT_VERSION: u16 = 1;

/// A reasonable limit on a single digit's payload word count, to prevent OOM
/// from malformed length fields. (64K words = 256 KiB)
pub const MAX_DIGIT_WORDS: usize = 64 * 1024;

//==================================================================================
// II. Run Manifest
//==================================================================================

/// Per-output-file statistics recorded in the manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ManifestOutput {
    /// File name relative to the output directory.
    pub file_name: String,
    /// Link ids that contributed at least one frame to this file, ascending.
    pub links: Vec<u16>,
    pub frames_written: u64,
    /// Total payload bytes, excluding headers.
    pub payload_bytes: u64,
    /// Total file size, headers included.
    pub total_bytes: u64,
}

/// The end-of-run summary, written exactly once after all destinations drain.
/// Downstream consumers use it to locate produced files without re-reading
/// them; its absence marks a run that aborted with partial output.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunManifest {
    pub writer_version: String,
    pub rdh_version: RdhVersion,
    pub readout: ReadoutMode,
    pub file_grouping: FileGrouping,
    pub outputs: Vec<ManifestOutput>,
    /// Digits dropped because their addressing mapped to no known link.
    pub dropped_digits: u64,
}

/// The file name the manifest is written under, inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "raw.cfg.json";
