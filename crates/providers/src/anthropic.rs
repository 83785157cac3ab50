//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siloed_core::error::ProviderError;
use siloed_core::provider::*;
use tracing::{debug, warn};

use crate::openai_compat::status_error;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(request: &GenerateRequest) -> serde_json::Value {
        let messages = vec![AnthropicMessage {
            role: "user".into(),
            content: request.input.clone(),
        }];

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::json!(request.system_prompt);
        }

        body
    }

    /// Concatenate the text blocks of a Messages API response.
    fn into_generate_response(
        resp: AnthropicResponse,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let mut text = String::new();

        for block in &resp.content {
            if let ResponseContentBlock::Text { text: part } = block {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(part);
            }
        }

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse(format!(
                "Anthropic response {} had no text blocks",
                resp.id
            )));
        }

        Ok(GenerateResponse {
            text,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            model: resp.model,
        })
    }
}

#[async_trait]
impl siloed_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(status_error(status, error_body));
        }

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Self::into_generate_response(api_resp)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use siloed_core::Provider;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test").with_base_url("http://proxy:8080/");
        assert_eq!(provider.base_url, "http://proxy:8080");
    }

    #[test]
    fn system_prompt_is_top_level() {
        let req = GenerateRequest::new("claude-3-haiku-20240307", "You are Mixtral", "hi");
        let body = AnthropicProvider::build_body(&req);
        assert_eq!(body["system"], "You are Mixtral");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn empty_system_prompt_omitted() {
        let req = GenerateRequest::new("claude-3-haiku-20240307", "", "hi");
        let body = AnthropicProvider::build_body(&req);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parse_text_response() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-3-haiku-20240307",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 4},
            "stop_reason": "end_turn"
        }"#;
        let api: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let resp = AnthropicProvider::into_generate_response(api).unwrap();
        assert_eq!(resp.text, "first\nsecond");
        assert_eq!(resp.input_tokens, 20);
        assert_eq!(resp.output_tokens, 4);
    }

    #[test]
    fn response_without_text_is_empty() {
        let raw = r#"{
            "id": "msg_2",
            "model": "claude-3-haiku-20240307",
            "content": [{"type": "tool_use", "id": "t", "name": "x", "input": {}}],
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }"#;
        let api: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let err = AnthropicProvider::into_generate_response(api).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(_)));
    }
}
