//! Text-generation provider implementations for Siloed.
//!
//! All providers implement the `siloed_core::Provider` trait.
//! The router builds the correct provider from a configuration section.

pub mod anthropic;
pub mod openai_compat;
pub mod retry;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
pub use router::build_from_config;
