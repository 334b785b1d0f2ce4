//! Recommendation Provider Abstraction
//!
//! Defines the [`LlmProvider`] trait: one prompt in, plain text out.
//! Failures are [`ProviderError`]s classified by [`ErrorCategory`] so the
//! recommendation stage can count attempts and fall back.
//!
//! ## Providers
//!
//! - `gemini`: Google Generative Language API (default)
//! - `openai`: any OpenAI-compatible Chat Completions endpoint

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, ProviderError};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::types::{PulseError, Result};

/// Shared provider type for concurrent tenant runs.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Text-generation provider contract
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for `prompt`
    ///
    /// Errors are always `PulseError::Provider` with a category.
    async fn complete(&self, prompt: &str, max_output_tokens: u32, temperature: f32)
    -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &LlmConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        _ => Err(PulseError::Config(format!(
            "Unknown provider: {}. Supported: gemini, openai",
            config.provider
        ))),
    }
}

/// HTTP client shared by the provider implementations
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(
            crate::constants::network::CONNECTION_TIMEOUT_SECS,
        ))
        .build()
        .map_err(|e| PulseError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-success response into a classified provider error
pub(crate) async fn error_from_response(response: reqwest::Response, provider: &str) -> PulseError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    let mut error = ErrorClassifier::classify_http_status(
        status,
        &format!("HTTP {}: {}", status, body.trim()),
        provider,
    );
    if let Some(wait) = retry_after {
        error = error.retry_after(wait);
    }
    error.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_requires_known_name() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config),
            Err(PulseError::Config(_))
        ));
    }

    #[test]
    fn test_create_provider_by_name() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o-mini");
    }
}
