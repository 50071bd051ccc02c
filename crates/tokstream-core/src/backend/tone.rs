//! Synthetic backend producing a deterministic tone per token
//!
//! Useful for demos and for exercising the pipeline without a conversion
//! service. Each token becomes exactly `ms_per_token` of audio, so overlap
//! trimming lines up with token boundaries.

use async_stream::stream;
use async_trait::async_trait;
use std::time::Duration;

use super::{ConversionBackend, ConversionRequest, FrameStream};
use crate::audio::AudioFrame;
use crate::config::TokenType;
use crate::error::{Error, Result};
use crate::lexer::Token;

/// Configuration for [`ToneBackend`]
#[derive(Debug, Clone)]
pub struct ToneBackend {
    sample_rate: u32,
    tokens_per_frame: usize,
    frame_delay: Duration,
}

impl Default for ToneBackend {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            tokens_per_frame: 10,
            frame_delay: Duration::ZERO,
        }
    }
}

impl ToneBackend {
    pub fn new(sample_rate: u32, tokens_per_frame: usize) -> Self {
        Self {
            sample_rate,
            tokens_per_frame: tokens_per_frame.max(1),
            ..Self::default()
        }
    }

    /// Sleep this long before yielding each frame, imitating real-time synthesis.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn samples_per_token(&self, token_type: TokenType) -> usize {
        (self.sample_rate as u64 * token_type.ms_per_token() / 1000) as usize
    }

    /// Render one token's worth of 16-bit mono PCM.
    fn render(&self, token: Token, offset: usize, samples: usize, out: &mut Vec<u8>) {
        let freq = 220.0 + (token % 100) as f32 * 5.0;
        for i in 0..samples {
            let time = (offset + i) as f32 / self.sample_rate as f32;
            let value = (2.0 * std::f32::consts::PI * freq * time).sin() * 0.3;
            let sample = (value.clamp(-1.0, 1.0) * 32767.0) as i16;
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

#[async_trait]
impl ConversionBackend for ToneBackend {
    async fn convert(&self, request: ConversionRequest) -> Result<FrameStream> {
        let this = self.clone();
        let samples_per_token = self.samples_per_token(request.token_type);

        let frames = stream! {
            let mut offset = 0;
            for group in request.tokens.chunks(this.tokens_per_frame) {
                if !this.frame_delay.is_zero() {
                    tokio::time::sleep(this.frame_delay).await;
                }

                let mut data = Vec::with_capacity(group.len() * samples_per_token * 2);
                for &token in group {
                    this.render(token, offset, samples_per_token, &mut data);
                    offset += samples_per_token;
                }
                yield Ok::<_, Error>(AudioFrame::new(data, this.sample_rate, 1));
            }
        };

        Ok(Box::pin(frames))
    }
}
