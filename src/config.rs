//! TOML configuration.
//!
//! Every section has defaults so a minimal file only needs the parts that
//! differ. [`load_config`] parses and validates in one step; anything it
//! rejects is a configuration error and is fatal before any work starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::chunk::ChunkParams;
use crate::error::RagError;
use crate::prompt::{PromptFormat, DEFAULT_TOKEN_BUDGET};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub conversation_log: Option<ConversationLogConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            path: default_documents_path(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("documents")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams, RagError> {
        ChunkParams::new(self.chunk_size, self.chunk_overlap)
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index_store")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_system_message")]
    pub system_message: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            system_message: default_system_message(),
        }
    }
}

fn default_token_budget() -> usize {
    DEFAULT_TOKEN_BUDGET
}
fn default_system_message() -> String {
    "You are a helpful assistant.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

pub const EMBEDDING_PROVIDERS: [&str; 3] = ["ollama", "openai", "local"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProvider {
    Ollama,
    OpenaiCompatible,
}

/// One named language model and the prompt format it was trained on.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model: String,
    pub prompt_format: PromptFormat,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding a bearer token, if the server needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_tokens() -> u32 {
    512
}
fn default_model_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationLogConfig {
    pub path: PathBuf,
}

impl Config {
    /// Check every constraint that does not need a running backend.
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.params()?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::config("retrieval.top_k must be >= 1"));
        }

        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(RagError::config(format!(
                "unknown embedding provider '{}': expected one of {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::config("embedding.batch_size must be > 0"));
        }

        for (name, model) in &self.models {
            if !(model.temperature >= 0.0) {
                return Err(RagError::config(format!(
                    "models.{}.temperature must be >= 0.0",
                    name
                )));
            }
            if !(model.top_p > 0.0 && model.top_p <= 1.0) {
                return Err(RagError::config(format!(
                    "models.{}.top_p must be in (0.0, 1.0]",
                    name
                )));
            }
        }

        if let Some(name) = &self.llm.default_model {
            self.model(name)?;
        }

        Ok(())
    }

    /// Look up a model by name, or the configured default when `name` is
    /// `None`.
    pub fn resolve_model(&self, name: Option<&str>) -> Result<(&str, &ModelConfig), RagError> {
        let name = match name.or(self.llm.default_model.as_deref()) {
            Some(name) => name,
            None => {
                return Err(RagError::config(
                    "no model selected: pass --model or set llm.default_model",
                ))
            }
        };
        let (key, model) = self
            .models
            .get_key_value(name)
            .ok_or_else(|| self.unknown_model(name))?;
        Ok((key.as_str(), model))
    }

    pub fn model(&self, name: &str) -> Result<&ModelConfig, RagError> {
        self.models.get(name).ok_or_else(|| self.unknown_model(name))
    }

    fn unknown_model(&self, name: &str) -> RagError {
        let available: Vec<&str> = self.models.keys().map(String::as_str).collect();
        RagError::config(format!(
            "model '{}' not recognized. Available models: {}",
            name,
            if available.is_empty() {
                "(none configured)".to_string()
            } else {
                available.join(", ")
            }
        ))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r####"
[documents]
path = "docs"
exclude_globs = ["drafts/**"]

[chunking]
chunk_size = 400
chunk_overlap = 50

[index]
path = "store"

[retrieval]
top_k = 3

[prompt]
token_budget = 2000
system_message = "Answer from context."

[embedding]
provider = "ollama"
model = "nomic-embed-text"

[llm]
default_model = "mistral"

[models.mistral]
provider = "ollama"
model = "mistral"
prompt_format = "inst"
temperature = 0.1
top_p = 0.5
stop = ["###"]

[models.tinyllama]
provider = "openai-compatible"
model = "tinyllama"
prompt_format = "plain-text"
url = "http://localhost:8080"

[conversation_log]
path = "log.json"
"####;

    #[test]
    fn parses_full_config() {
        let config = parse_config(FULL).unwrap();
        assert_eq!(config.documents.path, PathBuf::from("docs"));
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.prompt.token_budget, 2000);
        let (name, model) = config.resolve_model(None).unwrap();
        assert_eq!(name, "mistral");
        assert_eq!(model.prompt_format, PromptFormat::InstructionBracket);
        assert_eq!(model.stop, vec!["###"]);
        let tiny = config.model("tinyllama").unwrap();
        assert_eq!(tiny.provider, ModelProvider::OpenaiCompatible);
        assert_eq!(tiny.temperature, 0.7);
        assert!(config.conversation_log.is_some());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.prompt.token_budget, 3500);
        assert_eq!(config.index.path, PathBuf::from("index_store"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(format!("{:#}", err).contains("chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_prompt_format() {
        let toml = "[models.m]\nprovider = \"ollama\"\nmodel = \"m\"\nprompt_format = \"yaml\"\n";
        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn rejects_unknown_default_model() {
        let err = parse_config("[llm]\ndefault_model = \"ghost\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("ghost"));
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn rejects_zero_top_k() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn unknown_model_lists_available() {
        let config = parse_config(FULL).unwrap();
        let err = config.model("gpt").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mistral"));
        assert!(msg.contains("tinyllama"));
    }
}
