//! AI Integration Layer
//!
//! Text-generation providers and the prompt used for recommendations.

pub mod prompt;
pub mod provider;

pub use prompt::{PromptBuilder, PromptSection, RecommendationPrompt};
pub use provider::{
    ErrorCategory, ErrorClassifier, GeminiProvider, LlmProvider, OpenAiProvider, ProviderError,
    SharedProvider, create_provider,
};
