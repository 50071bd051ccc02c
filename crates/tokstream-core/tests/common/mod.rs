#![allow(dead_code)]

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokstream_core::{
    AudioFrame, ConversionBackend, ConversionRequest, EngineConfig, Error, FrameStream, Result,
    Token, Token2Audio, VoicePromptTable,
};

/// Sample rate used by [`ScriptedBackend`]: one sample per millisecond.
pub const SAMPLE_RATE: u32 = 1000;

type DelayFn = dyn Fn(&[Token]) -> Duration + Send + Sync;
type FailFn = dyn Fn(&[Token]) -> bool + Send + Sync;

/// A recorded backend call.
#[derive(Debug, Clone)]
pub struct Call {
    pub tokens: Vec<Token>,
    pub at: Instant,
}

/// Backend whose output encodes its input.
///
/// Each token becomes one frame of exactly one token's worth of audio whose
/// samples all carry the token value, so trimmed overlap and ordering can be
/// checked by reading the first sample of every delivered frame.
pub struct ScriptedBackend {
    delay: Box<DelayFn>,
    frame_delay: Duration,
    fail: Box<FailFn>,
    unavailable: bool,
    calls: Mutex<Vec<Call>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            delay: Box::new(|_| Duration::ZERO),
            frame_delay: Duration::ZERO,
            fail: Box::new(|_| false),
            unavailable: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    /// Stall before the first frame for as long as `delay` says.
    pub fn with_delay(mut self, delay: impl Fn(&[Token]) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Fail the call up front for batches matching `fail`.
    pub fn failing_when(mut self, fail: impl Fn(&[Token]) -> bool + Send + Sync + 'static) -> Self {
        self.fail = Box::new(fail);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn batches(&self) -> Vec<Vec<Token>> {
        self.calls.lock().iter().map(|c| c.tokens.clone()).collect()
    }
}

#[async_trait]
impl ConversionBackend for ScriptedBackend {
    async fn convert(&self, request: ConversionRequest) -> Result<FrameStream> {
        let tokens = request.tokens.to_vec();
        self.calls.lock().push(Call {
            tokens: tokens.clone(),
            at: Instant::now(),
        });

        if (self.fail)(&tokens) {
            return Err(Error::BackendError("scripted failure".into()));
        }

        let delay = (self.delay)(&tokens);
        let frame_delay = self.frame_delay;
        let samples = request.token_type.ms_per_token() as usize;

        Ok(Box::pin(stream! {
            tokio::time::sleep(delay).await;
            for token in tokens {
                if !frame_delay.is_zero() {
                    tokio::time::sleep(frame_delay).await;
                }
                let data: Vec<u8> = std::iter::repeat((token as i16).to_le_bytes())
                    .take(samples)
                    .flatten()
                    .collect();
                yield Ok::<_, Error>(AudioFrame::new(data, SAMPLE_RATE, 1));
            }
        }))
    }

    async fn probe(&self) -> Result<()> {
        if self.unavailable {
            return Err(Error::BackendUnavailable("scripted outage".into()));
        }
        Ok(())
    }
}

/// First sample of a frame produced by [`ScriptedBackend`].
pub fn token_of(frame: &AudioFrame) -> Token {
    i16::from_le_bytes([frame.data[0], frame.data[1]]) as Token
}

/// Engine over a shared scripted backend with the default voice table.
pub fn engine(config: EngineConfig, backend: Arc<ScriptedBackend>) -> Token2Audio {
    Token2Audio::new(config, backend, Arc::new(VoicePromptTable::default())).unwrap()
}

/// Callback collecting delivered token values.
pub fn collector() -> (Arc<Mutex<Vec<Token>>>, impl FnMut(AudioFrame) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |frame: AudioFrame| sink.lock().push(token_of(&frame)))
}

pub fn chunk(tokens: impl IntoIterator<Item = Token>) -> String {
    tokens
        .into_iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
