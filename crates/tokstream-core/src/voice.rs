//! Voice id to prompt reference resolution

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Maps a caller-facing voice id to the prompt reference a backend expects.
#[async_trait]
pub trait PromptResolver: Send + Sync {
    async fn resolve(&self, voice_id: &str) -> Result<String>;
}

fn default_fallback() -> Option<String> {
    Some("prompt_wav_for_{voice}".to_string())
}

/// Static voice table, typically loaded from configuration.
///
/// Unknown voices fall back to `fallback` with `{voice}` substituted, or are
/// rejected when no fallback is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePromptTable {
    #[serde(default)]
    pub voices: HashMap<String, String>,

    #[serde(default = "default_fallback")]
    pub fallback: Option<String>,
}

impl Default for VoicePromptTable {
    fn default() -> Self {
        Self {
            voices: HashMap::new(),
            fallback: default_fallback(),
        }
    }
}

impl VoicePromptTable {
    /// A table that only knows the voices inserted into it.
    pub fn strict() -> Self {
        Self {
            voices: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.voices.insert(voice_id.into(), prompt.into());
        self
    }
}

#[async_trait]
impl PromptResolver for VoicePromptTable {
    async fn resolve(&self, voice_id: &str) -> Result<String> {
        let voice_id = voice_id.trim();
        if voice_id.is_empty() {
            return Err(Error::VoiceNotFound("empty voice id".to_string()));
        }

        if let Some(prompt) = self.voices.get(voice_id) {
            return Ok(prompt.clone());
        }

        match &self.fallback {
            Some(template) => {
                debug!("Voice {voice_id} not in table, using fallback template");
                Ok(template.replace("{voice}", voice_id))
            }
            None => Err(Error::VoiceNotFound(voice_id.to_string())),
        }
    }
}
