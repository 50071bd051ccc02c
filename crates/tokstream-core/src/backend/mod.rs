//! Conversion backends
//!
//! A backend turns one batch of tokens into a lazy stream of audio frames.
//! The engine treats it as an opaque streaming call that may fail before the
//! first frame or at any point while it is being consumed.

mod http;
mod tone;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::config::{BackendRouting, TokenType};
use crate::error::Result;
use crate::lexer::Token;

pub use http::HttpBackend;
pub use tone::ToneBackend;

/// Lazily produced frames of one conversion call.
pub type FrameStream = BoxStream<'static, Result<AudioFrame>>;

/// Everything a backend needs for a single batch conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub tokens: Arc<[Token]>,
    pub prompt_reference: String,
    pub token_type: TokenType,
    /// Fresh per call, for backend-side tracing and idempotency
    pub request_id: String,
    pub routing: BackendRouting,
}

#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Start converting `request`; frames are pulled from the returned stream.
    async fn convert(&self, request: ConversionRequest) -> Result<FrameStream>;

    /// Checked once when a session starts. A failure aborts the session.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}
