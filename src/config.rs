//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional JSON configuration file
pub const CONFIG_PATH_ENV: &str = "DICTATION_CONFIG";

/// Environment variable overriding the rewriting service API key
pub const LLM_API_KEY_ENV: &str = "DICTATION_LLM_API_KEY";

/// A spoken phrase that is replaced by a literal snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechPreset {
    /// Phrase matched against the trimmed transcript
    pub name: String,
    /// Text committed instead of the transcript
    pub content: String,
}

/// Settings handed to the rewriting service on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    /// System prompt used by `process`; empty means the service default
    pub prompt: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: 0.2,
            prompt: String::new(),
        }
    }
}

impl RewriteConfig {
    /// Whether enough is configured to attempt a call at all
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
            && !self.endpoint.trim().is_empty()
            && !self.model.trim().is_empty()
    }
}

/// Keyboard session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Send dictation results through the rewriting service
    pub postprocess_enabled: bool,

    /// Strip trailing punctuation from final transcripts
    pub trim_final_trailing_punct: bool,

    /// Without a selection, AI edit targets the last committed result
    /// instead of the whole field
    pub ai_edit_default_to_last_asr: bool,

    pub speech_presets: Vec<SpeechPreset>,

    pub rewrite: RewriteConfig,

    /// Watchdog for a final result that never arrives
    pub processing_timeout_ms: u64,

    /// How long the last-request timing stays visible before going idle
    pub timing_hint_ms: u64,

    /// Characters read on each side of the cursor
    pub context_window: usize,

    pub clipboard_snippet_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postprocess_enabled: false,
            trim_final_trailing_punct: false,
            ai_edit_default_to_last_asr: true,
            speech_presets: Vec::new(),
            rewrite: RewriteConfig::default(),
            processing_timeout_ms: 8_000,
            timing_hint_ms: 1_500,
            context_window: 10_000,
            clipboard_snippet_chars: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };

        if let Ok(key) = std::env::var(LLM_API_KEY_ENV) {
            config.rewrite.api_key = key;
        }

        Ok(config)
    }

    /// Parse configuration from a JSON file
    pub fn from_file(path: PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from a JSON string; missing fields take defaults
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse configuration")
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn timing_hint(&self) -> Duration {
        Duration::from_millis(self.timing_hint_ms)
    }

    /// Whether dictation results go through the rewriting service
    pub fn rewriting_active(&self) -> bool {
        self.postprocess_enabled && self.rewrite.has_credentials()
    }
}
