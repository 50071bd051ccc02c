//! Server configuration
//!
//! Layered from an optional TOML file and `TOKSTREAM__*` environment
//! variables (`TOKSTREAM__PORT=9000`, `TOKSTREAM__ENGINE__WORKER_COUNT=8`).

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokstream_core::{ConversionBackend, EngineConfig, HttpBackend, ToneBackend, VoicePromptTable};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tokstream.toml";

const ENV_PREFIX: &str = "TOKSTREAM";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub voices: VoicePromptTable,

    #[serde(default)]
    pub backend: BackendConfig,
}

/// Which conversion backend sessions run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Http,
    /// Synthetic tones, no external service needed
    #[default]
    Tone,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the token2audio service; falls back to `engine.routing.endpoint`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_tone_sample_rate")]
    pub tone_sample_rate: u32,

    #[serde(default = "default_tone_tokens_per_frame")]
    pub tone_tokens_per_frame: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            endpoint: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            tone_sample_rate: default_tone_sample_rate(),
            tone_tokens_per_frame: default_tone_tokens_per_frame(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_tone_sample_rate() -> u32 {
    24000
}

fn default_tone_tokens_per_frame() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            engine: EngineConfig::default(),
            voices: VoicePromptTable::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load `path` (optional on disk) overlaid with environment variables.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source())
            .build()?;
        Self::finish(settings)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(s, FileFormat::Toml))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> anyhow::Result<Self> {
        let config: Self = settings.try_deserialize()?;
        config.engine.validate()?;
        if config.backend.kind == BackendKind::Http && config.http_endpoint().is_none() {
            anyhow::bail!("backend.kind = \"http\" needs backend.endpoint or engine.routing.endpoint");
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    fn http_endpoint(&self) -> Option<&str> {
        let endpoint = self
            .backend
            .endpoint
            .as_deref()
            .unwrap_or(self.engine.routing.endpoint.as_str());
        (!endpoint.trim().is_empty()).then_some(endpoint)
    }

    /// Build the configured backend.
    pub fn build_backend(&self) -> tokstream_core::Result<Arc<dyn ConversionBackend>> {
        match self.backend.kind {
            BackendKind::Tone => Ok(Arc::new(ToneBackend::new(
                self.backend.tone_sample_rate,
                self.backend.tone_tokens_per_frame,
            ))),
            BackendKind::Http => {
                let endpoint = self.http_endpoint().ok_or_else(|| {
                    tokstream_core::Error::ConfigError("no backend endpoint configured".into())
                })?;
                let backend = HttpBackend::new(
                    endpoint,
                    Duration::from_millis(self.backend.connect_timeout_ms),
                )?;
                Ok(Arc::new(backend))
            }
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokstream_core::TokenType;

    #[test]
    fn defaults_use_the_tone_backend() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.backend.kind, BackendKind::Tone);
        assert_eq!(config.engine.worker_count, 4);
        assert!(config.build_backend().is_ok());
    }

    #[test]
    fn parses_nested_sections() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 9000

            [engine]
            token_type = "1f"
            worker_count = 8
            cold_start_token_threshold = 20

            [engine.routing]
            endpoint = "http://tts.local:8000"
            model = "cosyvoice2"

            [voices]
            fallback = "prompts/{voice}.wav"

            [voices.voices]
            alice = "prompts/alice-studio.wav"

            [backend]
            kind = "http"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.engine.token_type, TokenType::T1f);
        assert_eq!(config.engine.worker_count, 8);
        assert_eq!(config.engine.cold_start_token_threshold, 20);
        assert_eq!(config.engine.routing.model, "cosyvoice2");
        assert_eq!(config.voices.voices["alice"], "prompts/alice-studio.wav");
        assert_eq!(config.http_endpoint(), Some("http://tts.local:8000"));
        assert!(config.build_backend().is_ok());
    }

    #[test]
    fn http_backend_requires_an_endpoint() {
        let err = ServerConfig::from_toml_str("[backend]\nkind = \"http\"\n").unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn invalid_engine_settings_are_rejected() {
        assert!(ServerConfig::from_toml_str("[engine]\nworker_count = 0\n").is_err());
    }

    #[test]
    fn bind_addr_combines_host_and_port() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:3000");
    }
}
