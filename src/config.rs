//! Configuration types for sage runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use sage_search::SearchConfig;

use crate::error::SageError;
use crate::knowledge::MasteryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SageConfig {
    /// Source selection, fetch limits and ranking settings.
    pub search: SearchConfig,
    /// Whole-run settings.
    pub pipeline: PipelineConfig,
    /// Summarization provider settings.
    pub summarizer: SummarizerConfig,
    /// Knowledge store settings.
    pub knowledge: KnowledgeConfig,
}

/// Whole-run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall deadline for retrieval in one run.
    pub run_timeout_seconds: u64,
    /// Maximum characters of a document sent to the summarizer.
    pub summary_max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_seconds: 60,
            summary_max_chars: 6_000,
        }
    }
}

impl PipelineConfig {
    /// Overall run timeout as a [`Duration`].
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

/// OpenAI-compatible summarization provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Base URL of the chat-completions API (without `/chat/completions`).
    pub api_url: String,
    /// Model name to request.
    pub api_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff between provider-error retries.
    pub retry_backoff_ms: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens per summary.
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_owned(),
            api_model: "gpt-4.1-mini".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            max_retries: 2,
            retry_backoff_ms: 500,
            temperature: 0.7,
            max_tokens: 300,
        }
    }
}

impl SummarizerConfig {
    /// Read the API key from [`Self::api_key_env`], ignoring blank values.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Directory holding `sage.db`.
    pub root_dir: PathBuf,
    /// Covered subtopics needed before mastery reaches intermediate.
    pub intermediate_after: usize,
    /// Covered subtopics needed before mastery reaches advanced.
    pub advanced_after: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root_dir: crate::sage_dirs::knowledge_dir(),
            intermediate_after: 5,
            advanced_after: 15,
        }
    }
}

impl KnowledgeConfig {
    /// Mastery thresholds derived from this config.
    pub fn mastery_policy(&self) -> MasteryPolicy {
        MasteryPolicy {
            intermediate_after: self.intermediate_after,
            advanced_after: self.advanced_after,
        }
    }
}

impl SageConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SageError::Config(e.to_string()))
    }

    /// Load the file at `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sage/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sage").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sage")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sage-config/config.toml")
        }
    }

    /// Check every section for values that would make a run impossible.
    ///
    /// # Errors
    ///
    /// Returns [`SageError::Search`] or [`SageError::Config`] naming the
    /// first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.search.validate()?;
        if self.pipeline.run_timeout_seconds == 0 {
            return Err(SageError::Config(
                "pipeline.run_timeout_seconds must be at least 1".into(),
            ));
        }
        if self.pipeline.summary_max_chars == 0 {
            return Err(SageError::Config(
                "pipeline.summary_max_chars must be at least 1".into(),
            ));
        }
        if self.summarizer.api_url.trim().is_empty() {
            return Err(SageError::Config("summarizer.api_url must be set".into()));
        }
        if self.knowledge.intermediate_after > self.knowledge.advanced_after {
            return Err(SageError::Config(
                "knowledge.intermediate_after must not exceed knowledge.advanced_after".into(),
            ));
        }
        Ok(())
    }
}
