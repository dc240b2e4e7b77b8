// In: src/config.rs

//! The single source of truth for all digit2raw conversion configuration.
//!
//! This module defines the unified `RawConfig` struct, which is designed to be
//! created once at the application boundary (the CLI) and then passed down
//! through the system via a shared, read-only `Arc<RawConfig>`.
//!
//! This approach centralizes all settings and eliminates the ambient mutable
//! globals the framework glue this tool replaces used to rely on.

use serde::{Deserialize, Serialize};

use crate::error::RawError;
use crate::rdh;

//==================================================================================
// I. Core Configuration Enums
//==================================================================================

/// The Raw Data Header layout version stamped on every frame of a run.
///
/// The version is selected once at startup and never changes mid-stream;
/// mixing versions within one run is impossible by construction because the
/// whole pipeline shares one `Arc<RawConfig>`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RdhVersion {
    /// **Default:** the 48-byte layout with 32-bit orbit and sequence counters.
    #[default]
    V4,
    /// The 64-byte layout with widened 64-bit orbit and sequence counters.
    V6,
}

impl RdhVersion {
    /// Parses the numeric CLI value (`--rdh-version`) into a known layout.
    pub fn from_cli(v: u32) -> Result<Self, RawError> {
        match v {
            4 => Ok(RdhVersion::V4),
            6 => Ok(RdhVersion::V6),
            other => Err(RawError::Config(format!(
                "Unknown RDH version {} (supported: 4, 6)",
                other
            ))),
        }
    }

    /// The fixed encoded size of a header in this layout, in bytes.
    pub fn header_size(&self) -> usize {
        match self {
            RdhVersion::V4 => rdh::RDH_V4_SIZE,
            RdhVersion::V6 => rdh::RDH_V6_SIZE,
        }
    }
}

/// Defines which timing fields of the RDH are populated.
///
/// Continuous readout stamps the heartbeat clock (orbit + bunch crossing);
/// triggered readout stamps the trigger word instead. The mode never changes
/// the header's fixed length.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadoutMode {
    /// **Default:** frames are anchored to trigger words.
    #[default]
    Triggered,
    /// Frames are anchored to the free-running heartbeat clock.
    Continuous,
}

/// Defines how link destinations are grouped into output files.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileGrouping {
    /// **Default:** all links merged into a single raw file.
    #[default]
    Merged,
    /// One file per half-CRU group of 15 links.
    PerHalfCru,
}

//==================================================================================
// II. The Unified RawConfig
//==================================================================================

/// The single, unified configuration for one conversion run.
/// This struct is created once and shared throughout the system via an `Arc`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct RawConfig {
    /// The RDH layout to stamp on every frame.
    #[serde(default)]
    pub rdh_version: RdhVersion,

    /// Continuous vs. triggered readout.
    #[serde(default)]
    pub readout: ReadoutMode,

    /// **The maximum encoded size of one frame (header + payload), in bytes.**
    /// A sealed frame never exceeds this; a single digit that cannot fit in an
    /// otherwise empty frame is a fatal framing-invariant violation.
    #[serde(default = "default_super_page_size")]
    pub super_page_size: usize,

    /// If true, empty heartbeat frames are suppressed, except for the anchor
    /// frame that opens each super-period on every destination.
    #[serde(default)]
    pub skip_empty_hbf: bool,

    /// How link destinations are grouped into output files.
    #[serde(default)]
    pub file_grouping: FileGrouping,

    /// Number of heartbeat windows (orbits) per super-period. Window 0 of each
    /// super-period is the framing anchor that is always emitted.
    #[serde(default = "default_orbits_per_superperiod")]
    pub orbits_per_superperiod: u32,

    /// Logging detail level, mapped onto the `log` filter by the CLI.
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            rdh_version: RdhVersion::default(),
            readout: ReadoutMode::default(),
            super_page_size: default_super_page_size(),
            skip_empty_hbf: false,
            file_grouping: FileGrouping::default(),
            orbits_per_superperiod: default_orbits_per_superperiod(),
            verbosity: 0,
        }
    }
}

impl RawConfig {
    /// Validates the configuration before any processing starts.
    ///
    /// All configuration errors are fatal and must surface here, at startup,
    /// never mid-stream.
    pub fn validate(&self) -> Result<(), RawError> {
        let header_size = self.rdh_version.header_size();
        if self.super_page_size <= header_size {
            return Err(RawError::Config(format!(
                "super_page_size ({} B) must exceed one RDH header ({} B)",
                self.super_page_size, header_size
            )));
        }
        if self.orbits_per_superperiod == 0 {
            return Err(RawError::Config(
                "orbits_per_superperiod must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Helper for `serde` to provide the default super-page size (1 MiB).
fn default_super_page_size() -> usize {
    1024 * 1024
}

/// Helper for `serde` to provide the default super-period length.
fn default_orbits_per_superperiod() -> u32 {
    128
}

//==================================================================================
// Unit Tests
//==================================================================================
