//! Recommendation Generator
//!
//! Asks the configured provider for a short recommendation and falls back
//! to [`fallback_recommendation`] when it cannot deliver. This stage never
//! fails a report.
//!
//! ## Attempt accounting
//!
//! ```text
//! attempt 1 ──fail──▶ attempt 2 ──fail──▶ ... ──▶ attempt N ──fail──▶ fallback
//!     │                   │                           │
//!     └──ok──▶ provider text (cleaned)  ◀─────────────┘
//! ```
//!
//! A timeout, an error status, a transport failure and an unusable answer
//! all count as one failed attempt. Only a provider-imposed `Retry-After`
//! delays the next attempt.

mod fallback;

pub use fallback::fallback_recommendation;

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ai::{RecommendationPrompt, SharedProvider};
use crate::config::LlmConfig;
use crate::constants::recommendation::{MAX_SENTENCES, MIN_USEFUL_CHARS};
use crate::insights::Insight;
use crate::kpi::KpiSnapshot;
use crate::pipeline::timeout::{TimeoutConfig, with_timeout};
use crate::types::{ProviderError, PulseError, ReportPeriod};

static HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s*").expect("Invalid header regex"));

static BULLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*+•]|\d+[.)])\s+").expect("Invalid bullet regex")
});

static EMPHASIS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{1,3}|_{2,3}|`+").expect("Invalid emphasis regex"));

static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Keep the first `max` sentences of `text`
pub fn limit_sentences(text: &str, max: usize) -> String {
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                count += 1;
                if count == max {
                    return text[..idx + ch.len_utf8()].trim().to_string();
                }
            }
        }
    }
    text.trim().to_string()
}

/// Strip markdown, collapse whitespace and cap the sentence count.
///
/// Returns `None` when what remains is too short to be useful.
pub fn clean_response(raw: &str) -> Option<String> {
    let text = HEADER_PATTERN.replace_all(raw, "");
    let text = BULLET_PATTERN.replace_all(&text, "");
    let text = EMPHASIS_PATTERN.replace_all(&text, "");
    let text = WHITESPACE_PATTERN.replace_all(text.trim(), " ");
    let text = limit_sentences(&text, MAX_SENTENCES);

    (text.chars().count() > MIN_USEFUL_CHARS).then_some(text)
}

// =============================================================================
// Recommendation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationSource {
    Provider {
        provider: String,
        attempts: u32,
    },
    Fallback {
        attempts: u32,
        last_error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub text: String,
    pub source: RecommendationSource,
}

impl Recommendation {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, RecommendationSource::Fallback { .. })
    }
}

/// Retry bookkeeping for one generation
#[derive(Debug, Clone)]
pub struct AttemptState {
    attempt: u32,
    max_attempts: u32,
    last_error: Option<String>,
    gave_up: bool,
}

impl AttemptState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
            gave_up: false,
        }
    }

    pub fn can_attempt(&self) -> bool {
        !self.gave_up && self.attempt < self.max_attempts
    }

    /// Start the next attempt and return its 1-based number
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Record a failed attempt; non-retryable provider errors end the loop
    pub fn record_failure(&mut self, error: &PulseError) {
        if let PulseError::Provider(e) = error {
            self.gave_up = !e.is_retryable();
        }
        self.last_error = Some(error.to_string());
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Everything the generator needs about one report
pub struct RecommendationRequest<'a> {
    pub tenant_name: &'a str,
    pub period: &'a ReportPeriod,
    pub currency: &'a str,
    pub kpis: &'a KpiSnapshot,
    pub insights: &'a [Insight],
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub max_attempts: u32,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Bound on a single provider call
    pub timeout: Duration,
}

impl GenerationSettings {
    /// `timeout` comes from [`TimeoutConfig::provider`], the single source
    /// for provider call bounds.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            timeout,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), TimeoutConfig::default().provider)
    }
}

pub struct RecommendationGenerator {
    provider: Option<SharedProvider>,
    settings: GenerationSettings,
}

impl RecommendationGenerator {
    pub fn new(provider: Option<SharedProvider>, settings: GenerationSettings) -> Self {
        Self { provider, settings }
    }

    /// Rule-based only
    pub fn offline() -> Self {
        Self::new(None, GenerationSettings::default())
    }

    pub async fn generate(&self, request: &RecommendationRequest<'_>) -> Recommendation {
        let mut state = AttemptState::new(self.settings.max_attempts);

        if let Some(provider) = &self.provider {
            let prompt = RecommendationPrompt {
                tenant_name: request.tenant_name,
                period: request.period,
                currency: request.currency,
                kpis: request.kpis,
                insights: request.insights,
            }
            .build();

            while state.can_attempt() {
                let attempt = state.begin();
                let outcome = with_timeout(
                    self.settings.timeout,
                    provider.complete(
                        &prompt,
                        self.settings.max_output_tokens,
                        self.settings.temperature,
                    ),
                    "recommendation provider",
                )
                .await
                .and_then(|raw| {
                    clean_response(&raw).ok_or_else(|| {
                        ProviderError::malformed(
                            format!("unusable answer ({} chars)", raw.trim().chars().count()),
                            provider.name(),
                        )
                        .into()
                    })
                });

                match outcome {
                    Ok(text) => {
                        debug!(provider = provider.name(), attempt, "Recommendation generated");
                        return Recommendation {
                            text,
                            source: RecommendationSource::Provider {
                                provider: provider.name().to_string(),
                                attempts: attempt,
                            },
                        };
                    }
                    Err(e) => {
                        warn!(
                            provider = provider.name(),
                            attempt,
                            max_attempts = self.settings.max_attempts,
                            error = %e,
                            "Recommendation attempt failed"
                        );
                        let wait = match &e {
                            PulseError::Provider(pe) => pe.retry_after,
                            _ => None,
                        };
                        state.record_failure(&e);
                        if let Some(wait) = wait.filter(|_| state.can_attempt()) {
                            tokio::time::sleep(wait.min(self.settings.timeout)).await;
                        }
                    }
                }
            }
        }

        info!(
            attempts = state.attempts(),
            "Using rule-based recommendation"
        );
        Recommendation {
            text: fallback_recommendation(request.kpis, request.insights),
            source: RecommendationSource::Fallback {
                attempts: state.attempts(),
                last_error: state.last_error().map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::LlmProvider;
    use crate::kpi::{KpiCalculator, PeriodAggregate};
    use crate::types::{Cadence, ErrorCategory, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails `failures` times with `category`, then answers
    struct MockProvider {
        calls: AtomicU32,
        failures: u32,
        category: ErrorCategory,
        answer: String,
    }

    impl MockProvider {
        fn new(failures: u32, category: ErrorCategory, answer: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                category,
                answer: answer.to_string(),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(&self, _prompt: &str, _max: u32, _temperature: f32) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(ProviderError::with_provider(self.category, "simulated", "mock").into());
            }
            Ok(self.answer.clone())
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-1"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(&self, _prompt: &str, _max: u32, _temperature: f32) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("Too late to matter for anyone reading this.".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "slow-1"
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            max_attempts: 3,
            max_output_tokens: 300,
            temperature: 0.7,
            timeout: Duration::from_millis(100),
        }
    }

    fn kpis() -> KpiSnapshot {
        let current = PeriodAggregate {
            revenue: Decimal::from(1_000),
            order_count: 4,
            ..Default::default()
        };
        KpiCalculator::default().compute(&current, &current)
    }

    async fn generate(generator: &RecommendationGenerator) -> Recommendation {
        let period = ReportPeriod::for_cadence(
            Cadence::Weekly,
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
        );
        let kpis = kpis();
        generator
            .generate(&RecommendationRequest {
                tenant_name: "Boulangerie",
                period: &period,
                currency: "XAF",
                kpis: &kpis,
                insights: &[],
            })
            .await
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = MockProvider::new(0, ErrorCategory::Network, "**Order more flour** before the weekend rush.");
        let generator = RecommendationGenerator::new(Some(provider.clone()), settings());

        let recommendation = generate(&generator).await;
        assert_eq!(recommendation.text, "Order more flour before the weekend rush.");
        assert_eq!(
            recommendation.source,
            RecommendationSource::Provider {
                provider: "mock".to_string(),
                attempts: 1
            }
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_success_on_third_attempt() {
        let provider = MockProvider::new(2, ErrorCategory::RateLimit, "Call your five best customers this week.");
        let generator = RecommendationGenerator::new(Some(provider.clone()), settings());

        let recommendation = generate(&generator).await;
        assert!(!recommendation.is_fallback());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_after_three_failures_without_fourth_call() {
        let provider = MockProvider::new(10, ErrorCategory::Network, "unused");
        let generator = RecommendationGenerator::new(Some(provider.clone()), settings());

        let recommendation = generate(&generator).await;
        assert_eq!(provider.call_count(), 3);
        match &recommendation.source {
            RecommendationSource::Fallback {
                attempts,
                last_error,
            } => {
                assert_eq!(*attempts, 3);
                assert!(last_error.as_deref().unwrap_or_default().contains("simulated"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(
            recommendation.text,
            fallback_recommendation(&kpis(), &[])
        );
    }

    #[tokio::test]
    async fn test_short_answers_count_as_failures() {
        let provider = MockProvider::new(0, ErrorCategory::Network, "OK.");
        let generator = RecommendationGenerator::new(Some(provider.clone()), settings());

        let recommendation = generate(&generator).await;
        assert!(recommendation.is_fallback());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_early() {
        let provider = MockProvider::new(10, ErrorCategory::Auth, "unused");
        let generator = RecommendationGenerator::new(Some(provider.clone()), settings());

        let recommendation = generate(&generator).await;
        assert!(recommendation.is_fallback());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeouts_fall_back() {
        let generator = RecommendationGenerator::new(Some(Arc::new(SlowProvider)), settings());
        let recommendation = generate(&generator).await;
        match recommendation.source {
            RecommendationSource::Fallback { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap_or_default().contains("Timeout"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_provider_uses_fallback() {
        let recommendation = generate(&RecommendationGenerator::offline()).await;
        assert_eq!(
            recommendation.source,
            RecommendationSource::Fallback {
                attempts: 0,
                last_error: None
            }
        );
        assert!(!recommendation.text.is_empty());
    }

    #[test]
    fn test_clean_response() {
        let raw = "## Advice\n\n- **Restock** croissants before Saturday.\n- Call _lapsed_ customers.\n\n1. Run a `mid-week` offer! Then relax? Finally, smile. Extra sentence.";
        let cleaned = clean_response(raw).unwrap();
        assert_eq!(
            cleaned,
            "Advice Restock croissants before Saturday. Call _lapsed_ customers. Run a mid-week offer! Then relax?"
        );
        assert!(clean_response("  **Ok.**  ").is_none());
    }

    #[test]
    fn test_limit_sentences_ignores_decimals() {
        assert_eq!(
            limit_sentences("Revenue grew 12.5% this week. Keep going. Done.", 2),
            "Revenue grew 12.5% this week. Keep going."
        );
        assert_eq!(limit_sentences("No terminator", 4), "No terminator");
    }

    #[test]
    fn test_settings_take_provider_timeout_from_timeout_config() {
        let mut config = crate::config::Config::default();
        config.llm.timeout_secs = 7;
        config.llm.max_attempts = 2;
        let timeouts = TimeoutConfig::from_config(&config);
        let settings = GenerationSettings::from_config(&config.llm, timeouts.provider);
        assert_eq!(settings.timeout, Duration::from_secs(7));
        assert_eq!(settings.max_attempts, 2);
        assert_eq!(
            GenerationSettings::default().timeout,
            TimeoutConfig::default().provider
        );
    }

    #[test]
    fn test_attempt_state() {
        let mut state = AttemptState::new(2);
        assert!(state.can_attempt());
        assert_eq!(state.begin(), 1);
        state.record_failure(&PulseError::timeout("provider", Duration::from_secs(1)));
        assert!(state.can_attempt());
        assert_eq!(state.begin(), 2);
        assert!(!state.can_attempt());
        assert!(state.last_error().unwrap().contains("Timeout"));
    }
}
