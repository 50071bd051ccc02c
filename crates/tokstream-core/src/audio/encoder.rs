//! WAV export of converted frame sequences

use hound::{WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

use super::frame::AudioFrame;
use crate::error::{Error, Result};

/// Concatenate 16-bit PCM frames into a single WAV file.
///
/// All frames must share one sample rate and channel count. An empty slice
/// yields `Ok(None)` since there is no format to write a header for.
pub fn encode_wav(frames: &[AudioFrame]) -> Result<Option<Vec<u8>>> {
    let Some(first) = frames.first() else {
        return Ok(None);
    };

    let spec = WavSpec {
        channels: first.channels,
        sample_rate: first.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)?;

        for (idx, frame) in frames.iter().enumerate() {
            if frame.sample_rate != spec.sample_rate || frame.channels != spec.channels {
                return Err(Error::AudioError(format!(
                    "frame {idx} is {} Hz / {} ch, expected {} Hz / {} ch",
                    frame.sample_rate, frame.channels, spec.sample_rate, spec.channels
                )));
            }

            for pair in frame.data.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
        }

        writer.finalize()?;
    }

    debug!(
        "Encoded {} frames to WAV ({} bytes)",
        frames.len(),
        buffer.get_ref().len()
    );
    Ok(Some(buffer.into_inner()))
}
