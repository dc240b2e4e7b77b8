// In: src/writer.rs

//! The writer/flush controller.
//!
//! Owns one buffered file handle per output target, appends sealed frames in
//! the order they arrive (header bytes first, payload words after), and
//! writes the run manifest exactly once after every destination has drained.
//! Handles are buffered `File`s released deterministically when the writer is
//! consumed by `finalize` or dropped on an error path; an aborted run leaves
//! no manifest behind, which is what marks its output as incomplete.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RawConfig;
use crate::demux::{FileTarget, LinkTable};
use crate::error::RawError;
use crate::format::{ManifestOutput, RunManifest, MANIFEST_FILE_NAME};
use crate::framer::SealedFrame;

/// One open output file plus its running statistics.
struct OutputFile {
    file: BufWriter<File>,
    file_name: String,
    links: BTreeSet<u16>,
    frames_written: u64,
    payload_bytes: u64,
    total_bytes: u64,
}

/// Routes sealed frames to their backing files and accounts for the manifest.
pub struct RawWriter {
    out_dir: PathBuf,
    config: Arc<RawConfig>,
    table: LinkTable,
    /// Arena of output contexts keyed by stable target index.
    outputs: BTreeMap<FileTarget, OutputFile>,
}

impl RawWriter {
    /// Opens the writer, creating the output directory if absent.
    /// Failure to create it is fatal: no output can be produced.
    pub fn create(
        out_dir: &Path,
        config: Arc<RawConfig>,
        table: LinkTable,
    ) -> Result<Self, RawError> {
        if !out_dir.exists() {
            fs::create_dir_all(out_dir)?;
            log::info!("created output directory {}", out_dir.display());
        }
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            config,
            table,
            outputs: BTreeMap::new(),
        })
    }

    /// Appends one sealed frame to its target file, preserving seal order.
    pub fn write_frame(&mut self, frame: &SealedFrame) -> Result<(), RawError> {
        let target = self.table.file_target(frame.link);
        let output = match self.outputs.entry(target) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                let file_name = self.table.file_name(target);
                let path = self.out_dir.join(&file_name);
                let file = BufWriter::new(File::create(&path)?);
                log::debug!("opened output file {}", path.display());
                e.insert(OutputFile {
                    file,
                    file_name,
                    links: BTreeSet::new(),
                    frames_written: 0,
                    payload_bytes: 0,
                    total_bytes: 0,
                })
            }
        };

        let header_bytes = frame.header.to_bytes()?;
        output.file.write_all(&header_bytes)?;
        // Payload words are serialized little-endian; the cast gives the raw
        // word bytes without an intermediate copy.
        let payload_bytes: &[u8] = bytemuck::cast_slice(&frame.payload);
        output.file.write_all(payload_bytes)?;

        output.links.insert(frame.link.value());
        output.frames_written += 1;
        output.payload_bytes += payload_bytes.len() as u64;
        output.total_bytes += (header_bytes.len() + payload_bytes.len()) as u64;

        log::trace!(
            "{}: frame seq {} ({} payload B) -> {}",
            frame.link,
            frame.header.frame_seq,
            payload_bytes.len(),
            output.file_name
        );
        Ok(())
    }

    /// Flushes every output and writes the run manifest exactly once.
    /// Consumes the writer; no frame can be appended afterwards.
    pub fn finalize(self, dropped_digits: u64) -> Result<RunManifest, RawError> {
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (_, mut output) in self.outputs {
            output.file.flush()?;
            outputs.push(ManifestOutput {
                file_name: output.file_name,
                links: output.links.into_iter().collect(),
                frames_written: output.frames_written,
                payload_bytes: output.payload_bytes,
                total_bytes: output.total_bytes,
            });
        }

        let manifest = RunManifest {
            writer_version: crate::VERSION.to_string(),
            rdh_version: self.config.rdh_version,
            readout: self.config.readout,
            file_grouping: self.config.file_grouping,
            outputs,
            dropped_digits,
        };

        let manifest_path = self.out_dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&manifest_path, json)?;
        log::info!("wrote run manifest {}", manifest_path.display());
        Ok(manifest)
    }
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileGrouping;
    use crate::rdh::{Rdh, FLAG_STOP};
    use crate::types::LinkId;

    fn frame(link: LinkId, payload: Vec<u32>, seq: u64) -> SealedFrame {
        let config = RawConfig::default();
        SealedFrame {
            link,
            header: Rdh {
                version: config.rdh_version,
                link,
                memory_size: (payload.len() * 4) as u32,
                orbit: 0,
                bunch_crossing: 0,
                flags: FLAG_STOP,
                trigger_type: 0,
                frame_seq: seq,
            },
            payload,
        }
    }

    #[test]
    fn test_frames_append_in_order_and_manifest_accounts_for_them() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(RawConfig::default());
        let table = LinkTable::new(FileGrouping::Merged);
        let mut writer = RawWriter::create(dir.path(), Arc::clone(&config), table).unwrap();

        writer.write_frame(&frame(LinkId(0), vec![0xA], 0)).unwrap();
        writer.write_frame(&frame(LinkId(1), vec![0xB, 0xC], 0)).unwrap();
        let manifest = writer.finalize(3).unwrap();

        assert_eq!(manifest.outputs.len(), 1);
        let out = &manifest.outputs[0];
        assert_eq!(out.file_name, "raw_merged.raw");
        assert_eq!(out.links, vec![0, 1]);
        assert_eq!(out.frames_written, 2);
        assert_eq!(out.payload_bytes, 12);
        assert_eq!(manifest.dropped_digits, 3);

        let bytes = fs::read(dir.path().join("raw_merged.raw")).unwrap();
        assert_eq!(bytes.len(), out.total_bytes as usize);
        // First frame decodes back from the head of the file.
        let rdh = Rdh::from_bytes(&bytes).unwrap();
        assert_eq!(rdh.link, LinkId(0));
        assert_eq!(rdh.memory_size, 4);

        // The manifest itself parses back.
        let json = fs::read_to_string(dir.path().join(MANIFEST_FILE_NAME)).unwrap();
        let parsed: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.dropped_digits, 3);
    }

    #[test]
    fn test_missing_output_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/raw");
        let config = Arc::new(RawConfig::default());
        let table = LinkTable::new(FileGrouping::Merged);
        let writer = RawWriter::create(&nested, config, table).unwrap();
        assert!(nested.is_dir());
        drop(writer);
    }

    #[test]
    fn test_per_halfcru_grouping_splits_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(RawConfig {
            file_grouping: FileGrouping::PerHalfCru,
            ..RawConfig::default()
        });
        let table = LinkTable::new(config.file_grouping);
        let mut writer = RawWriter::create(dir.path(), config, table).unwrap();

        writer.write_frame(&frame(LinkId(0), vec![1], 0)).unwrap();
        writer.write_frame(&frame(LinkId(30), vec![2], 0)).unwrap();
        let manifest = writer.finalize(0).unwrap();

        let names: Vec<_> = manifest
            .outputs
            .iter()
            .map(|o| o.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["raw_halfcru000.raw", "raw_halfcru002.raw"]);
    }
}
