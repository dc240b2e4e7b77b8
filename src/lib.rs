//! This file is the root of the `digit2raw` Rust crate.
//!
//! The crate converts time-ordered simulated detector digits into raw
//! data-link (CRU) files: digits are routed per link, accumulated into
//! heartbeat-bounded frames no larger than the configured super-page, stamped
//! with a versioned Raw Data Header, and flushed per output file, with a JSON
//! run manifest written once at end of run.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod config;
pub mod demux;
pub mod error;
pub mod format;
pub mod framer;
pub mod pipeline;
pub mod rdh;
pub mod source;
pub mod types;
pub mod writer;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use config::{FileGrouping, RawConfig, RdhVersion, ReadoutMode};
pub use error::RawError;
pub use pipeline::{run, Converter, RunSummary};
pub use types::{Digit, LinkId};
