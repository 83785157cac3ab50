//! Provider trait: the abstraction over text-generation backends.
//!
//! A Provider takes a system prompt plus one user input and returns the
//! generated text with token usage. The primary conversation model and the
//! delegate model are both reached through this one contract.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, Perplexity, Gemini,
//! local servers, Ollama) and Anthropic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The model to use (e.g., "gpt-3.5-turbo-0125", "mixtral-8x7b-local")
    pub model: String,

    /// System instructions (role preamble plus refinements)
    pub system_prompt: String,

    /// The user-role input
    pub input: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.5
}

impl GenerateRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            input: input.into(),
            temperature: default_temperature(),
            max_tokens: 100,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,

    /// Prompt-side token count (reported or estimated)
    pub input_tokens: u32,

    /// Completion-side token count (reported or estimated)
    pub output_tokens: u32,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl GenerateResponse {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Rough token estimate for backends that do not report usage (4 chars ≈ 1 token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// The core Provider trait.
///
/// The orchestration loop calls `generate()` without knowing which backend
/// is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "local").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = GenerateRequest::new("mixtral", "You are Mixtral", "Hello");
        assert!((req.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 100);
    }

    #[test]
    fn request_builders() {
        let req = GenerateRequest::new("m", "s", "i")
            .with_temperature(0.2)
            .with_max_tokens(512);
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 512);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("12345678901234567890"), 5);
        assert_eq!(estimate_tokens("123456789012345678901"), 6);
    }

    #[test]
    fn response_total() {
        let resp = GenerateResponse {
            text: "hi".into(),
            input_tokens: 10,
            output_tokens: 5,
            model: "m".into(),
        };
        assert_eq!(resp.total_tokens(), 15);
    }
}
