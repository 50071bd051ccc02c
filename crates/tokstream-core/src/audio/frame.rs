//! Audio frames and overlap trimming

use bytes::Bytes;
use std::time::Duration;
use tracing::trace;

/// Bytes per sample; backends deliver 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// One unit of playable audio as produced by a backend.
///
/// The payload is opaque to the engine apart from its length, which is what
/// play duration is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, sample_rate: u32, channels: u16) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels,
        }
    }

    /// Size in bytes of one sample across all channels.
    pub fn block_align(&self) -> usize {
        self.channels.max(1) as usize * BYTES_PER_SAMPLE
    }

    pub fn sample_frames(&self) -> usize {
        self.data.len() / self.block_align()
    }

    /// Play duration: `bytes / (channels * bytes_per_sample) / sample_rate`.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.sample_frames() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Number of bytes that cover `duration` at this frame's format,
    /// rounded to the nearest whole sample frame.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let scaled = duration.as_nanos() * self.sample_rate as u128;
        let samples = (scaled + 500_000_000) / 1_000_000_000;
        samples as usize * self.block_align()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Drops a fixed amount of leading audio from a batch's frame sequence.
///
/// The trim budget is expressed in time and converted to bytes per frame, so
/// frames of different formats are handled; whatever a frame cannot absorb
/// is carried into the next one.
#[derive(Debug, Clone)]
pub struct PrefixTrimmer {
    remaining: Duration,
}

impl PrefixTrimmer {
    pub fn new(trim: Duration) -> Self {
        Self { remaining: trim }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Trim the next frame. Returns `None` if the whole frame was consumed.
    pub fn trim(&mut self, frame: AudioFrame) -> Option<AudioFrame> {
        if self.remaining.is_zero() {
            return Some(frame);
        }

        let budget = frame.bytes_for(self.remaining);
        if budget >= frame.data.len() {
            self.remaining = self.remaining.saturating_sub(frame.duration());
            trace!(
                bytes = frame.data.len(),
                remaining_ms = self.remaining.as_millis() as u64,
                "dropped overlapping frame"
            );
            return None;
        }

        self.remaining = Duration::ZERO;
        let AudioFrame {
            data,
            sample_rate,
            channels,
        } = frame;
        let kept = data.slice(budget..);
        trace!(trimmed = budget, kept = kept.len(), "trimmed overlap prefix");
        Some(AudioFrame {
            data: kept,
            sample_rate,
            channels,
        })
    }
}
