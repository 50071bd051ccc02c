//! Error types for the tokstream conversion engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Prompt resolution failed: {0}")]
    PromptError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Audio encoding error: {0}")]
    AudioError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker pool closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error prevents a session from starting at all.
    ///
    /// Everything else is recovered per batch.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::VoiceNotFound(_)
                | Error::PromptError(_)
                | Error::BackendUnavailable(_)
                | Error::ConfigError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::AudioError(e.to_string())
    }
}
