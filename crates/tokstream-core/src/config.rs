//! Configuration types for the tokstream engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Token encoding variant emitted by the upstream model.
///
/// The variant fixes how much audio a single token stands for, which is what
/// overlap trimming is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TokenType {
    /// 24 ms of audio per token.
    #[default]
    #[serde(rename = "1o", alias = "")]
    T1o,
    /// 40 ms of audio per token.
    #[serde(rename = "1f")]
    T1f,
}

impl TokenType {
    pub fn ms_per_token(self) -> u64 {
        match self {
            TokenType::T1o => 24,
            TokenType::T1f => 40,
        }
    }

    /// Audio duration covered by `tokens` tokens of this type.
    pub fn duration_of(self, tokens: usize) -> Duration {
        Duration::from_millis(self.ms_per_token() * tokens as u64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::T1o => "1o",
            TokenType::T1f => "1f",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "1o" => Ok(TokenType::T1o),
            "1f" => Ok(TokenType::T1f),
            other => Err(Error::ConfigError(format!("unknown token type: {other}"))),
        }
    }
}

/// Routing parameters forwarded to the conversion backend on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRouting {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub direct: String,
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend endpoint / model routing
    #[serde(default)]
    pub routing: BackendRouting,

    /// Token encoding variant
    #[serde(default)]
    pub token_type: TokenType,

    /// Number of conversion worker slots
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Batches the dispatcher may keep in flight before it stops cutting
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,

    /// Tokens carried from the previous batch as converter context
    #[serde(default = "default_prefix_overlap_tokens")]
    pub prefix_overlap_tokens: usize,

    /// Pending tokens required before the very first batch
    #[serde(default = "default_cold_start_token_threshold")]
    pub cold_start_token_threshold: usize,

    /// Unplayed audio (seconds) at or below which the next batch is cut
    #[serde(default = "default_low_buffer_seconds")]
    pub low_buffer_seconds: f64,

    /// Seconds since the last cut after which pending tokens are flushed anyway
    #[serde(default = "default_forced_flush_interval_seconds")]
    pub forced_flush_interval_seconds: f64,

    /// Capacity of each worker's private frame queue
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Period of the idle flush-policy re-evaluation tick
    #[serde(default = "default_reevaluate_interval_ms")]
    pub reevaluate_interval_ms: u64,

    /// Upper bound on teardown after cancellation
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            routing: BackendRouting::default(),
            token_type: TokenType::default(),
            worker_count: default_worker_count(),
            pipeline_depth: default_pipeline_depth(),
            prefix_overlap_tokens: default_prefix_overlap_tokens(),
            cold_start_token_threshold: default_cold_start_token_threshold(),
            low_buffer_seconds: default_low_buffer_seconds(),
            forced_flush_interval_seconds: default_forced_flush_interval_seconds(),
            frame_queue_capacity: default_frame_queue_capacity(),
            reevaluate_interval_ms: default_reevaluate_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::ConfigError("worker_count must be at least 1".into()));
        }
        if self.pipeline_depth == 0 || self.pipeline_depth > self.worker_count {
            return Err(Error::ConfigError(format!(
                "pipeline_depth must be within 1..={} (got {})",
                self.worker_count, self.pipeline_depth
            )));
        }
        if self.frame_queue_capacity == 0 {
            return Err(Error::ConfigError(
                "frame_queue_capacity must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("low_buffer_seconds", self.low_buffer_seconds),
            ("forced_flush_interval_seconds", self.forced_flush_interval_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!(
                    "{name} must be a non-negative number (got {value})"
                )));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(Error::ConfigError(format!(
                    "{name} is too large to represent as a duration (got {value})"
                )));
            }
        }
        if self.reevaluate_interval_ms == 0 {
            return Err(Error::ConfigError(
                "reevaluate_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::from(self)
    }

    pub fn reevaluate_interval(&self) -> Duration {
        Duration::from_millis(self.reevaluate_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// The subset of configuration the dispatcher's flush policy reads.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub prefix_overlap_tokens: usize,
    pub cold_start_token_threshold: usize,
    pub low_buffer: Duration,
    pub forced_flush_interval: Duration,
    pub pipeline_depth: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for BatchPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            prefix_overlap_tokens: config.prefix_overlap_tokens,
            cold_start_token_threshold: config.cold_start_token_threshold,
            low_buffer: Duration::from_secs_f64(config.low_buffer_seconds),
            forced_flush_interval: Duration::from_secs_f64(config.forced_flush_interval_seconds),
            pipeline_depth: config.pipeline_depth,
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_pipeline_depth() -> usize {
    1
}

fn default_prefix_overlap_tokens() -> usize {
    5
}

fn default_cold_start_token_threshold() -> usize {
    50
}

fn default_low_buffer_seconds() -> f64 {
    0.5
}

fn default_forced_flush_interval_seconds() -> f64 {
    5.0
}

fn default_frame_queue_capacity() -> usize {
    32
}

fn default_reevaluate_interval_ms() -> u64 {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.pipeline_depth, 1);
        assert_eq!(config.prefix_overlap_tokens, 5);
        assert_eq!(config.cold_start_token_threshold, 50);
        assert_eq!(config.low_buffer_seconds, 0.5);
        assert_eq!(config.forced_flush_interval_seconds, 5.0);
        assert_eq!(config.token_type, TokenType::T1o);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn token_type_durations() {
        assert_eq!(TokenType::T1o.ms_per_token(), 24);
        assert_eq!(TokenType::T1f.ms_per_token(), 40);
        assert_eq!(TokenType::T1f.duration_of(5), Duration::from_millis(200));
        assert_eq!("".parse::<TokenType>().unwrap(), TokenType::T1o);
        assert_eq!("1f".parse::<TokenType>().unwrap(), TokenType::T1f);
        assert!("2x".parse::<TokenType>().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            token_type = "1f"
            worker_count = 2
            cold_start_token_threshold = 5

            [routing]
            model = "token2audio-stream"
            "#,
        )
        .unwrap();

        assert_eq!(config.token_type, TokenType::T1f);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.cold_start_token_threshold, 5);
        assert_eq!(config.routing.model, "token2audio-stream");
        assert_eq!(config.prefix_overlap_tokens, 5);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = EngineConfig::default();
        config.worker_count = 0;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let mut config = EngineConfig::default();
        config.pipeline_depth = 5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.low_buffer_seconds = f64::NAN;
        assert!(config.validate().is_err());

        // Finite, but past what a Duration can hold.
        let mut config = EngineConfig::default();
        config.forced_flush_interval_seconds = 1e20;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let mut config = EngineConfig::default();
        config.low_buffer_seconds = 1e20;
        assert!(config.validate().is_err());

        let err = EngineConfig::from_toml_str("forced_flush_interval_seconds = 1e20\n");
        assert!(matches!(err, Err(Error::ConfigError(_))));
    }

    #[test]
    fn batch_policy_from_config() {
        let policy = BatchPolicy::default();
        assert_eq!(policy.low_buffer, Duration::from_millis(500));
        assert_eq!(policy.forced_flush_interval, Duration::from_secs(5));
        assert_eq!(policy.pipeline_depth, 1);
    }
}
