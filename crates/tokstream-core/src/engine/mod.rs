//! Streaming token-to-audio engine.
//!
//! A session lexes incoming text chunks into tokens, lets the [`Dispatcher`]
//! decide when to cut batches, runs each batch on a bounded [`WorkerPool`]
//! and hands the resulting frames to the caller through the [`Sequencer`]
//! in submission order.
//!
//! ```text
//! chunks ─► lexer ─► Dispatcher ─► WorkerPool ─► WorkerSlot FIFO ─► Sequencer ─► on_frame
//!                        ▲                                              │
//!                        └──────────────── PlaybackClock ◄──────────────┘
//! ```

mod batch;
mod clock;
mod dispatcher;
mod pool;
mod sequencer;
mod session;
mod worker;

pub use batch::TokenBatch;
pub use clock::{ClockSnapshot, PlaybackClock};
pub use dispatcher::{Dispatcher, FlushReason};
pub use pool::{WorkerPool, WorkerSlot};
pub use sequencer::{Sequencer, SequencerReport};
pub use session::{Session, SessionHandle, SessionReport, SessionState};
pub use worker::{BatchOutcome, ConversionWorker, SlotMessage, WorkerContext};

use futures::Stream;
use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::backend::ConversionBackend;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::voice::PromptResolver;

/// Entry point: owns the configuration and the shared backend.
///
/// Cheap to share behind an `Arc`; every call to [`Token2Audio::convert`]
/// runs an independent session.
pub struct Token2Audio {
    config: EngineConfig,
    backend: Arc<dyn ConversionBackend>,
    resolver: Arc<dyn PromptResolver>,
}

impl Token2Audio {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn ConversionBackend>,
        resolver: Arc<dyn PromptResolver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            resolver,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a session without running it, to get at its [`SessionHandle`].
    pub fn session(&self) -> Session {
        Session::new(
            self.config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.resolver),
        )
    }

    /// Convert a stream of token text chunks for `voice_id`.
    ///
    /// `on_frame` is called once per frame, in order, never concurrently.
    /// Returns after the final frame has been delivered.
    pub async fn convert<S, T, F>(&self, chunks: S, voice_id: &str, on_frame: F) -> Result<SessionReport>
    where
        S: Stream<Item = T> + Send,
        T: AsRef<str> + Send,
        F: FnMut(AudioFrame) + Send + 'static,
    {
        self.session().run(chunks, voice_id, on_frame).await
    }
}
