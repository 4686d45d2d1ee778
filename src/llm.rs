//! Language-model backends.
//!
//! A [`LanguageModel`] turns a fully assembled prompt into a complete reply.
//! Prompts are sent raw: the backend's own chat template is bypassed because
//! [`crate::prompt::assemble`] has already serialized the conversation in the
//! model's format.

use anyhow::{anyhow, Context};
use reqwest::blocking::Client;

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{RagError, Result};
use crate::http;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_COMPATIBLE_URL: &str = "http://localhost:8080";

pub trait LanguageModel {
    /// Generate the full reply to `prompt`.
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Sampling parameters forwarded to the backend as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl Sampling {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            stop: config.stop.clone(),
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, temperature: Option<f32>, top_p: Option<f32>) -> Self {
        if let Some(t) = temperature {
            self.temperature = t;
        }
        if let Some(p) = top_p {
            self.top_p = p;
        }
        self
    }
}

pub struct OllamaModel {
    model: String,
    url: String,
    sampling: Sampling,
    client: Client,
}

impl OllamaModel {
    pub fn new(config: &ModelConfig, sampling: Sampling) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            sampling,
            client: http::client(config.timeout_secs).map_err(RagError::Model)?,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "raw": true,
            "stream": false,
            "options": {
                "temperature": self.sampling.temperature,
                "top_p": self.sampling.top_p,
                "num_predict": self.sampling.max_tokens,
                "stop": self.sampling.stop,
            },
        })
    }
}

impl LanguageModel for OllamaModel {
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = self.request_body(prompt);
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = http::post_json_with_retry(
            || self.client.post(&endpoint).json(&body),
            0,
            "Ollama",
        )
        .with_context(|| format!("is Ollama running at {}?", self.url))?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response text"))?;
        Ok(text.trim().to_string())
    }
}

/// Any server exposing the OpenAI `/v1/completions` endpoint (llama.cpp
/// server, vLLM, LM Studio, ...).
pub struct OpenAiCompatibleModel {
    model: String,
    url: String,
    api_key: Option<String>,
    sampling: Sampling,
    client: Client,
}

impl OpenAiCompatibleModel {
    pub fn new(config: &ModelConfig, sampling: Sampling) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                RagError::config(format!("{} environment variable not set", var))
            })?),
            None => None,
        };
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_COMPATIBLE_URL.to_string()),
            api_key,
            sampling,
            client: http::client(config.timeout_secs).map_err(RagError::Model)?,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": self.sampling.temperature,
            "top_p": self.sampling.top_p,
            "max_tokens": self.sampling.max_tokens,
        });
        if !self.sampling.stop.is_empty() {
            body["stop"] = serde_json::json!(self.sampling.stop);
        }
        body
    }
}

impl LanguageModel for OpenAiCompatibleModel {
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = self.request_body(prompt);
        let endpoint = format!("{}/v1/completions", self.url.trim_end_matches('/'));
        let json = http::post_json_with_retry(
            || {
                let request = self.client.post(&endpoint).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            },
            0,
            "Completion API",
        )?;
        let text = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("Invalid completion response: missing choices[0].text"))?;
        Ok(text.trim().to_string())
    }
}

/// Build the backend for one configured model.
pub fn create_model(config: &ModelConfig, sampling: Sampling) -> Result<Box<dyn LanguageModel>> {
    match config.provider {
        ModelProvider::Ollama => Ok(Box::new(OllamaModel::new(config, sampling)?)),
        ModelProvider::OpenaiCompatible => {
            Ok(Box::new(OpenAiCompatibleModel::new(config, sampling)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptFormat;

    fn config(provider: ModelProvider) -> ModelConfig {
        ModelConfig {
            provider,
            model: "mistral".to_string(),
            prompt_format: PromptFormat::InstructionBracket,
            url: None,
            api_key_env: None,
            temperature: 0.1,
            top_p: 0.5,
            max_tokens: 256,
            stop: vec!["###".to_string()],
            timeout_secs: 5,
        }
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let sampling = Sampling::from_config(&config(ModelProvider::Ollama))
            .with_overrides(Some(0.9), None);
        assert_eq!(sampling.temperature, 0.9);
        assert_eq!(sampling.top_p, 0.5);
        assert_eq!(sampling.stop, vec!["###"]);
    }

    #[test]
    fn ollama_body_is_raw_and_unstreamed() {
        let cfg = config(ModelProvider::Ollama);
        let model = OllamaModel::new(&cfg, Sampling::from_config(&cfg)).unwrap();
        let body = model.request_body("[INST] hi [/INST]");
        assert_eq!(body["raw"], true);
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["options"]["stop"][0], "###");
    }

    #[test]
    fn completion_body_carries_sampling() {
        let cfg = config(ModelProvider::OpenaiCompatible);
        let model = OpenAiCompatibleModel::new(&cfg, Sampling::from_config(&cfg)).unwrap();
        let body = model.request_body("User: hi");
        assert_eq!(body["prompt"], "User: hi");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stop"][0], "###");
    }

    #[test]
    fn missing_api_key_env_is_config_error() {
        let mut cfg = config(ModelProvider::OpenaiCompatible);
        cfg.api_key_env = Some("LRAG_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        let err = create_model(&cfg, Sampling::from_config(&cfg)).err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
