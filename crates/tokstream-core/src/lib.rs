//! Tokstream Core - Streaming Speech-Token to Audio Conversion
//!
//! This crate turns an incrementally arriving stream of speech-token text
//! into an ordered stream of PCM audio frames, as early and as smoothly as
//! possible.
//!
//! # Architecture
//!
//! - Adaptive batching driven by a playback clock (cold start, low buffer,
//!   forced flush)
//! - Overlapping token prefixes between consecutive batches, trimmed from
//!   the output audio
//! - A bounded worker pool converting batches concurrently
//! - In-order delivery of frames regardless of worker completion order
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokstream_core::{EngineConfig, Token2Audio, ToneBackend, VoicePromptTable};
//!
//! let engine = Token2Audio::new(
//!     EngineConfig::default(),
//!     Arc::new(ToneBackend::default()),
//!     Arc::new(VoicePromptTable::default()),
//! )?;
//!
//! let chunks = futures::stream::iter(["888,265,", "1189,4502"]);
//! let report = engine.convert(chunks, "alice", |frame| play(frame)).await?;
//! ```

pub mod audio;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod voice;

pub use audio::{encode_wav, AudioFrame};
pub use backend::{ConversionBackend, ConversionRequest, FrameStream, HttpBackend, ToneBackend};
pub use config::{BackendRouting, BatchPolicy, EngineConfig, TokenType};
pub use engine::{SessionHandle, SessionReport, SessionState, Token2Audio};
pub use error::{Error, Result};
pub use lexer::{lex, lex_all, Token};
pub use voice::{PromptResolver, VoicePromptTable};
