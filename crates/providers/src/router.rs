//! Provider construction from configuration.
//!
//! Maps a `[primary]` / `[delegate]` section to a concrete backend and wraps
//! it in a [`RetryProvider`] when retries are enabled.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryProvider;
use siloed_config::{ConfigError, ProviderConfig, RetryConfig};
use siloed_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const PERPLEXITY_URL: &str = "https://api.perplexity.ai";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Build one provider from its configuration section.
pub fn build_from_config(
    config: &ProviderConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn Provider>, ConfigError> {
    let kind = config.normalized_kind();

    let require_key = || {
        config.api_key.clone().ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "provider '{kind}' needs an API key (set api_key or one of {:?})",
                config.api_key_env_vars()
            ))
        })
    };

    let hosted = |default_url: &str| -> Result<Arc<dyn Provider>, ConfigError> {
        let base_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| default_url.to_string());
        let provider: Arc<dyn Provider> =
            Arc::new(OpenAiCompatProvider::new(&kind, base_url, require_key()?));
        Ok(provider)
    };

    let base: Arc<dyn Provider> = match kind.as_str() {
        "local" => match &config.api_url {
            Some(url) => Arc::new(OpenAiCompatProvider::new("local", url, "local")),
            None => Arc::new(OpenAiCompatProvider::local(config.port.unwrap_or(8080))),
        },
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(config.api_url.as_deref())),
        "anthropic" => {
            let mut p = AnthropicProvider::new(require_key()?);
            if let Some(url) = &config.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "openai" => hosted(OPENAI_URL)?,
        "perplexity" => hosted(PERPLEXITY_URL)?,
        "gemini" => hosted(GEMINI_URL)?,
        "custom" => {
            let url = config.api_url.clone().ok_or_else(|| {
                ConfigError::ValidationError("custom provider needs api_url".into())
            })?;
            Arc::new(OpenAiCompatProvider::new(
                "custom",
                url,
                config.api_key.clone().unwrap_or_default(),
            ))
        }
        other => {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider kind '{other}'"
            )));
        }
    };

    debug!(provider = %base.name(), model = %config.model, "Provider built");

    if retry.max_retries == 0 {
        return Ok(base);
    }

    Ok(Arc::new(RetryProvider::new(
        base,
        retry.max_retries,
        Duration::from_millis(retry.initial_backoff_ms),
    )))
}
