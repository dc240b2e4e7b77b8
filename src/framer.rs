// In: src/framer.rs

//! The per-destination frame builder.
//!
//! Each link destination owns one `FrameBuilder` that accumulates its digits
//! into frames bounded by (a) the configured super-page size and (b) the
//! heartbeat window, one orbit of the bunch-crossing clock. Frames are sealed
//! with a version-stamped RDH and handed off in seal order; the builder never
//! shares mutable state with any other destination.
//!
//! State machine per destination:
//! `Idle -> Accumulating -> Sealed -> Flushed`, cycling
//! `Accumulating -> Sealed -> Flushed` per frame and terminating in `Idle`
//! once the input stream is drained.
//!
//! Empty-window rules: when `skip_empty_hbf` is set, a window with zero
//! digits emits no frame, except the anchor window that opens each
//! super-period, which is always emitted so downstream consumers keep a
//! framing reference even across quiet periods.

use std::mem;
use std::sync::Arc;

use crate::config::{RawConfig, ReadoutMode};
use crate::error::RawError;
use crate::rdh::{Rdh, FLAG_CONTINUOUS, FLAG_EMPTY, FLAG_STOP};
use crate::types::{Digit, LinkId};

/// Bunch-crossing clock ticks per orbit; one heartbeat window is one orbit.
pub const TICKS_PER_ORBIT: u64 = 3564;

//==================================================================================
// Public Structs
//==================================================================================

/// A sealed frame, ready for the writer. Destroyed once flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFrame {
    pub link: LinkId,
    pub header: Rdh,
    pub payload: Vec<u32>,
}

impl SealedFrame {
    /// Total encoded size, header included.
    pub fn encoded_size(&self) -> usize {
        self.header.header_size() + self.payload.len() * std::mem::size_of::<u32>()
    }
}

/// Lifecycle of one destination's builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Idle,
    Accumulating,
    Sealed,
    Flushed,
}

/// Accumulates time-ordered digits for one link into bounded frames.
pub struct FrameBuilder {
    link: LinkId,
    config: Arc<RawConfig>,
    /// Heartbeat window currently being filled.
    window: u64,
    payload: Vec<u32>,
    /// Frames already sealed within the current window (continuations).
    window_frame_count: u32,
    /// Per-link monotonic frame counter.
    frame_seq: u64,
    last_timestamp: Option<u64>,
    state: BuilderState,
    drained: bool,
}

impl FrameBuilder {
    pub fn new(link: LinkId, config: Arc<RawConfig>) -> Self {
        Self {
            link,
            config,
            window: 0,
            payload: Vec::new(),
            window_frame_count: 0,
            frame_seq: 0,
            last_timestamp: None,
            state: BuilderState::Idle,
            drained: false,
        }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Payload capacity of one frame in words.
    fn max_payload_words(&self) -> usize {
        (self.config.super_page_size - self.config.rdh_version.header_size())
            / std::mem::size_of::<u32>()
    }

    fn is_anchor_window(&self, window: u64) -> bool {
        window % u64::from(self.config.orbits_per_superperiod) == 0
    }

    /// Accepts the next digit for this link, sealing any frames completed by
    /// its arrival into `out`.
    pub fn push(&mut self, digit: &Digit, out: &mut Vec<SealedFrame>) -> Result<(), RawError> {
        if self.drained {
            return Err(RawError::Internal(format!(
                "{}: push after drain",
                self.link
            )));
        }
        if let Some(last) = self.last_timestamp {
            if digit.timestamp < last {
                return Err(RawError::Internal(format!(
                    "{}: digit timestamps regressed ({} < {})",
                    self.link, digit.timestamp, last
                )));
            }
        }

        // Oversized digit: would exceed the super-page even as the sole
        // occupant of a frame. Configuration/size mismatch, never truncate.
        if digit.payload.len() > self.max_payload_words() {
            return Err(RawError::FramingInvariant(format!(
                "{}: digit of {} payload bytes cannot fit a {} B super-page with a {} B header",
                self.link,
                digit.payload_bytes(),
                self.config.super_page_size,
                self.config.rdh_version.header_size()
            )));
        }

        // Advance through any windows the stream has moved past, closing each.
        let target_window = digit.timestamp / TICKS_PER_ORBIT;
        while self.window < target_window {
            self.close_window(out)?;
            self.window += 1;
            self.window_frame_count = 0;
        }

        // Size bound: seal a continuation frame before overflowing.
        if self.payload.len() + digit.payload.len() > self.max_payload_words() {
            self.seal_frame(out, false)?;
        }

        self.payload.extend_from_slice(&digit.payload);
        self.last_timestamp = Some(digit.timestamp);
        self.state = BuilderState::Accumulating;
        Ok(())
    }

    /// Closes the input stream for this link, sealing the final window.
    /// A builder that never saw a digit still emits its super-period anchor.
    pub fn drain(&mut self, out: &mut Vec<SealedFrame>) -> Result<(), RawError> {
        if self.drained {
            return Ok(());
        }
        self.close_window(out)?;
        self.drained = true;
        Ok(())
    }

    /// Acknowledges that all frames sealed so far have been flushed.
    pub fn mark_flushed(&mut self) {
        self.state = if self.drained {
            BuilderState::Idle
        } else {
            match self.state {
                BuilderState::Sealed => BuilderState::Flushed,
                other => other,
            }
        };
    }

    /// Seals the closing frame of the current window, applying the
    /// empty-frame suppression rules.
    fn close_window(&mut self, out: &mut Vec<SealedFrame>) -> Result<(), RawError> {
        let window_is_empty = self.payload.is_empty() && self.window_frame_count == 0;
        if window_is_empty {
            let must_emit = !self.config.skip_empty_hbf || self.is_anchor_window(self.window);
            if !must_emit {
                return Ok(());
            }
        }
        self.seal_frame(out, true)
    }

    /// Seals the accumulated payload into one frame. `stop` marks the
    /// window's closing frame.
    fn seal_frame(&mut self, out: &mut Vec<SealedFrame>, stop: bool) -> Result<(), RawError> {
        let payload = mem::take(&mut self.payload);
        let memory_size = u32::try_from(payload.len() * std::mem::size_of::<u32>())
            .map_err(|_| RawError::Internal("frame payload exceeds u32 bytes".into()))?;

        let mut flags = 0u16;
        if stop {
            flags |= FLAG_STOP;
        }
        if payload.is_empty() {
            flags |= FLAG_EMPTY;
        }

        // The readout mode decides which timing fields carry the window id.
        let (orbit, bunch_crossing, trigger_type) = match self.config.readout {
            ReadoutMode::Continuous => {
                flags |= FLAG_CONTINUOUS;
                (self.window, 0u16, 0u32)
            }
            ReadoutMode::Triggered => (0u64, 0u16, self.window as u32),
        };

        let header = Rdh {
            version: self.config.rdh_version,
            link: self.link,
            memory_size,
            orbit,
            bunch_crossing,
            flags,
            trigger_type,
            frame_seq: self.frame_seq,
        };

        self.frame_seq += 1;
        self.window_frame_count += 1;
        self.state = BuilderState::Sealed;
        out.push(SealedFrame {
            link: self.link,
            header,
            payload,
        });
        Ok(())
    }
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RdhVersion;

    fn config() -> Arc<RawConfig> {
        Arc::new(RawConfig::default())
    }

    fn digit(timestamp: u64, payload: Vec<u32>) -> Digit {
        Digit {
            timestamp,
            module: 0,
            side: 0,
            payload,
        }
    }

    fn concat_payloads(frames: &[SealedFrame]) -> Vec<u32> {
        frames.iter().flat_map(|f| f.payload.clone()).collect()
    }

    #[test]
    fn test_single_window_digits_land_in_one_frame() {
        let mut builder = FrameBuilder::new(LinkId(0), config());
        let mut out = Vec::new();
        builder.push(&digit(0, vec![0x1]), &mut out).unwrap();
        builder.push(&digit(1, vec![0x2]), &mut out).unwrap();
        builder.drain(&mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, vec![0x1, 0x2]);
        assert!(out[0].header.is_stop());
        assert!(!out[0].header.is_empty());
        assert_eq!(out[0].header.memory_size, 8);
    }

    #[test]
    fn test_super_page_bound_splits_into_continuations() {
        let cfg = Arc::new(RawConfig {
            super_page_size: crate::rdh::RDH_V4_SIZE + 16, // 4 words of payload
            ..RawConfig::default()
        });
        let mut builder = FrameBuilder::new(LinkId(9), Arc::clone(&cfg));
        let mut out = Vec::new();
        for i in 0..10u32 {
            builder.push(&digit(5, vec![i, i + 100]), &mut out).unwrap();
        }
        builder.drain(&mut out).unwrap();

        // 20 words at 4 words per frame: 5 frames, last one carrying the stop.
        assert_eq!(out.len(), 5);
        for frame in &out {
            assert!(frame.encoded_size() <= cfg.super_page_size);
        }
        assert!(out[..4].iter().all(|f| !f.header.is_stop()));
        assert!(out[4].header.is_stop());

        // Payload conservation, in input order.
        let expected: Vec<u32> = (0..10u32).flat_map(|i| vec![i, i + 100]).collect();
        assert_eq!(concat_payloads(&out), expected);

        // Sequence counter is monotonic per link.
        let seqs: Vec<u64> = out.iter().map(|f| f.header.frame_seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_windows_are_emitted_without_suppression() {
        let mut builder = FrameBuilder::new(LinkId(1), config());
        let mut out = Vec::new();
        // First digit three windows in: windows 0..2 close empty first.
        builder
            .push(&digit(3 * TICKS_PER_ORBIT, vec![0xAB]), &mut out)
            .unwrap();
        builder.drain(&mut out).unwrap();

        assert_eq!(out.len(), 4);
        assert!(out[..3].iter().all(|f| f.header.is_empty()));
        assert_eq!(out[3].payload, vec![0xAB]);
    }

    #[test]
    fn test_suppression_keeps_only_the_anchor() {
        let cfg = Arc::new(RawConfig {
            skip_empty_hbf: true,
            ..RawConfig::default()
        });
        let mut builder = FrameBuilder::new(LinkId(2), cfg);
        let mut out = Vec::new();
        builder
            .push(&digit(5 * TICKS_PER_ORBIT, vec![0xCD]), &mut out)
            .unwrap();
        builder.drain(&mut out).unwrap();

        // Anchor (window 0) plus the data frame; windows 1..4 suppressed.
        assert_eq!(out.len(), 2);
        assert!(out[0].header.is_empty());
        assert_eq!(out[0].header.frame_seq, 0);
        assert_eq!(out[1].payload, vec![0xCD]);
    }

    #[test]
    fn test_quiet_destination_still_writes_its_anchor() {
        let cfg = Arc::new(RawConfig {
            skip_empty_hbf: true,
            ..RawConfig::default()
        });
        let mut builder = FrameBuilder::new(LinkId(3), cfg);
        let mut out = Vec::new();
        builder.drain(&mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].header.is_empty());
        assert!(out[0].header.is_stop());
    }

    #[test]
    fn test_oversized_digit_is_a_fatal_framing_violation() {
        let cfg = Arc::new(RawConfig {
            super_page_size: crate::rdh::RDH_V4_SIZE + 8,
            ..RawConfig::default()
        });
        let mut builder = FrameBuilder::new(LinkId(4), cfg);
        let mut out = Vec::new();
        let res = builder.push(&digit(0, vec![1, 2, 3]), &mut out);
        assert!(matches!(res, Err(RawError::FramingInvariant(_))));
    }

    #[test]
    fn test_continuous_mode_stamps_the_heartbeat_clock() {
        let cfg = Arc::new(RawConfig {
            readout: crate::config::ReadoutMode::Continuous,
            rdh_version: RdhVersion::V6,
            ..RawConfig::default()
        });
        let mut builder = FrameBuilder::new(LinkId(5), cfg);
        let mut out = Vec::new();
        builder
            .push(&digit(2 * TICKS_PER_ORBIT + 7, vec![0xEE]), &mut out)
            .unwrap();
        builder.drain(&mut out).unwrap();

        let data_frame = out.last().unwrap();
        assert_eq!(data_frame.header.orbit, 2);
        assert_eq!(data_frame.header.trigger_type, 0);
        assert_eq!(data_frame.header.flags & FLAG_CONTINUOUS, FLAG_CONTINUOUS);
    }

    #[test]
    fn test_state_machine_cycle() {
        let mut builder = FrameBuilder::new(LinkId(6), config());
        let mut out = Vec::new();
        assert_eq!(builder.state(), BuilderState::Idle);

        builder.push(&digit(0, vec![1]), &mut out).unwrap();
        assert_eq!(builder.state(), BuilderState::Accumulating);

        builder
            .push(&digit(TICKS_PER_ORBIT, vec![2]), &mut out)
            .unwrap();
        // Crossing the window boundary sealed a frame before accumulating again.
        assert_eq!(out.len(), 1);
        assert_eq!(builder.state(), BuilderState::Accumulating);

        builder.drain(&mut out).unwrap();
        assert_eq!(builder.state(), BuilderState::Sealed);
        builder.mark_flushed();
        assert_eq!(builder.state(), BuilderState::Idle);
    }
}
