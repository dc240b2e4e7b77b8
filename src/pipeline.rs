// In: src/pipeline.rs

//! The single-pass conversion coordinator.
//!
//! This module acts as a high-level coordinator, delegating routing to the
//! demultiplexer, accumulation to the per-link frame builders, and I/O to the
//! writer. It processes the digit stream in one ordered pass; destinations
//! never share mutable frame state, and cross-destination ordering is neither
//! guaranteed nor required.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::RawConfig;
use crate::demux::LinkTable;
use crate::error::RawError;
use crate::format::RunManifest;
use crate::framer::{FrameBuilder, SealedFrame};
use crate::source;
use crate::types::{Digit, LinkId};
use crate::writer::RawWriter;

/// End-of-run counters surfaced to the caller and the log.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub digits_read: u64,
    pub digits_dropped: u64,
    pub frames_written: u64,
    pub manifest: RunManifest,
}

/// A streaming converter: digits in, sealed frames out to disk.
///
/// Created once per run from a validated config; `finish` drains every
/// destination and writes the manifest.
pub struct Converter {
    config: Arc<RawConfig>,
    table: LinkTable,
    writer: RawWriter,
    /// Per-destination builders, keyed by stable link id.
    builders: BTreeMap<LinkId, FrameBuilder>,
    scratch: Vec<SealedFrame>,
    digits_read: u64,
    digits_dropped: u64,
    frames_written: u64,
}

impl Converter {
    /// Validates the configuration and opens the output directory.
    /// 1. All configuration errors surface here, before any digit moves.
    pub fn create(config: Arc<RawConfig>, out_dir: &Path) -> Result<Self, RawError> {
        config.validate()?;
        let table = LinkTable::new(config.file_grouping);
        let writer = RawWriter::create(out_dir, Arc::clone(&config), table.clone())?;
        Ok(Self {
            config,
            table,
            writer,
            builders: BTreeMap::new(),
            scratch: Vec::new(),
            digits_read: 0,
            digits_dropped: 0,
            frames_written: 0,
        })
    }

    /// Registers a destination so it participates in anchor-frame emission
    /// even if no digit ever routes to it.
    pub fn ensure_link(&mut self, link: LinkId) {
        let config = Arc::clone(&self.config);
        self.builders
            .entry(link)
            .or_insert_with(|| FrameBuilder::new(link, config));
    }

    /// Routes and accumulates one digit.
    ///
    /// Addressing failures are recoverable: the digit is dropped, counted,
    /// and processing continues. Everything else aborts the run.
    pub fn push_digit(&mut self, digit: &Digit) -> Result<(), RawError> {
        self.digits_read += 1;
        let link = match self.table.route(digit.module, digit.side) {
            Ok(link) => link,
            Err(RawError::Addressing(msg)) => {
                self.digits_dropped += 1;
                log::warn!("dropping digit: {}", msg);
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        self.ensure_link(link);
        let builder = self
            .builders
            .get_mut(&link)
            .ok_or_else(|| RawError::Internal("builder vanished after ensure_link".into()))?;
        builder.push(digit, &mut self.scratch)?;
        self.flush_scratch()
    }

    /// Drains every destination, flushes the last frames, and writes the
    /// manifest exactly once.
    pub fn finish(mut self) -> Result<RunSummary, RawError> {
        for builder in self.builders.values_mut() {
            builder.drain(&mut self.scratch)?;
        }
        self.flush_scratch()?;
        for builder in self.builders.values_mut() {
            builder.mark_flushed();
        }

        let manifest = self.writer.finalize(self.digits_dropped)?;
        if self.digits_dropped > 0 {
            log::warn!(
                "{} digit(s) dropped for unknown addressing",
                self.digits_dropped
            );
        }
        log::info!(
            "conversion complete: {} digits -> {} frames across {} file(s)",
            self.digits_read,
            self.frames_written,
            manifest.outputs.len()
        );
        Ok(RunSummary {
            digits_read: self.digits_read,
            digits_dropped: self.digits_dropped,
            frames_written: self.frames_written,
            manifest,
        })
    }

    fn flush_scratch(&mut self) -> Result<(), RawError> {
        for frame in self.scratch.drain(..) {
            self.writer.write_frame(&frame)?;
            self.frames_written += 1;
        }
        Ok(())
    }
}

/// Runs a whole conversion: read the digit container, stream it through a
/// `Converter`, and return the end-of-run summary.
pub fn run(config: Arc<RawConfig>, input: &Path, out_dir: &Path) -> Result<RunSummary, RawError> {
    let digits = source::read_digit_file(input)?;
    log::info!(
        "read {} digit(s) from {}",
        digits.len(),
        input.display()
    );

    let mut converter = Converter::create(config, out_dir)?;
    for digit in &digits {
        converter.push_digit(digit)?;
    }
    converter.finish()
}

//==================================================================================
// Unit Tests
//==================================================================================
