//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, Perplexity, Gemini (OpenAI compatibility layer),
//! Ollama, llama.cpp / vLLM style local servers, and any endpoint exposing
//! `/chat/completions`.
//!
//! Local servers often omit `usage`; token counts are then estimated from
//! the request and reply text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siloed_core::error::ProviderError;
use siloed_core::provider::*;
use tracing::{debug, warn};

/// An OpenAI-compatible text-generation provider.
///
/// This handles the vast majority of backends since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create a Perplexity provider (convenience constructor).
    pub fn perplexity(api_key: impl Into<String>) -> Self {
        Self::new("perplexity", "https://api.perplexity.ai", api_key)
    }

    /// Create a Gemini provider through Google's OpenAI compatibility layer.
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Create a provider for a model served on this machine.
    pub fn local(port: u16) -> Self {
        Self::new("local", format!("http://localhost:{port}/v1"), "local")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the chat completion body: one system message, one user message.
    fn build_body(request: &GenerateRequest) -> serde_json::Value {
        let messages = vec![
            ApiMessage {
                role: "system".into(),
                content: request.system_prompt.clone(),
            },
            ApiMessage {
                role: "user".into(),
                content: request.input.clone(),
            },
        ];

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        })
    }

    /// Turn a decoded API response into a [`GenerateResponse`].
    fn into_generate_response(
        api_response: ApiResponse,
        request: &GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse("No choices in response".into()))?;

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "Choice carried no message content".into(),
            ));
        }

        let (input_tokens, output_tokens) = match api_response.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => {
                let prompt = format!("{}{}", request.system_prompt, request.input);
                (
                    saturate(estimate_tokens(&prompt)),
                    saturate(estimate_tokens(&text)),
                )
            }
        };

        Ok(GenerateResponse {
            text,
            input_tokens,
            output_tokens,
            model: api_response.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}

fn saturate(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Map a non-200 HTTP status to a provider error.
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => {
            ProviderError::AuthenticationFailed("Invalid API key or insufficient permissions".into())
        }
        404 => ProviderError::ModelNotFound(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl siloed_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::into_generate_response(api_response, &request)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use siloed_core::Provider;

    fn request() -> GenerateRequest {
        GenerateRequest::new("mixtral-8x7b-local", "You are Mixtral", "Plan a garden")
            .with_max_tokens(64)
    }

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url().contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn local_constructor_uses_port() {
        let provider = OpenAiCompatProvider::local(8085);
        assert_eq!(provider.base_url(), "http://localhost:8085/v1");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://host:9000/v1/", "k");
        assert_eq!(provider.base_url(), "http://host:9000/v1");
    }

    #[test]
    fn body_has_system_and_user_messages() {
        let body = OpenAiCompatProvider::build_body(&request());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are Mixtral");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Plan a garden");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parse_response_with_usage() {
        let raw = r#"{
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let resp = OpenAiCompatProvider::into_generate_response(api, &request()).unwrap();
        assert_eq!(resp.text, "hello");
        assert_eq!(resp.input_tokens, 12);
        assert_eq!(resp.output_tokens, 3);
        assert_eq!(resp.model, "gpt-3.5-turbo-0125");
    }

    #[test]
    fn missing_usage_is_estimated() {
        let raw = r#"{"choices": [{"message": {"content": "abcdefgh"}}]}"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let req = request();
        let resp = OpenAiCompatProvider::into_generate_response(api, &req).unwrap();
        let prompt = format!("{}{}", req.system_prompt, req.input);
        assert_eq!(u64::from(resp.input_tokens), estimate_tokens(&prompt));
        assert_eq!(resp.output_tokens, 2);
        assert_eq!(resp.model, "mixtral-8x7b-local");
    }

    #[test]
    fn no_choices_is_empty_response() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = OpenAiCompatProvider::into_generate_response(api, &request()).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(404, "no model".into()),
            ProviderError::ModelNotFound(_)
        ));
        match status_error(503, "overloaded".into()) {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("Expected ApiError, got: {other:?}"),
        }
    }
}
