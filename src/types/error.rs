//! Unified Error Type System
//!
//! One error enum (`PulseError`) for the whole crate, plus the structured
//! payloads the pipeline routes on:
//!
//! - **ProviderError**: recommendation provider failures, classified by
//!   [`ErrorCategory`]. Recovered locally by retry and fallback.
//! - **DeliveryError**: channel send failures. Fatal to one tenant's run.
//! - **ValidationError**: malformed requests or configuration. Fatal before
//!   any stage runs.
//! - **DataAccess**: metrics source failures. Fatal to one tenant's run.

use std::time::Duration;
use thiserror::Error;

use crate::types::report::Transport;

// =============================================================================
// Error Categories
// =============================================================================

/// Provider error categories used for attempt accounting and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Quota or rate limit reached
    RateLimit,
    /// Credentials rejected
    Auth,
    /// Connectivity issue or timeout
    Network,
    /// Provider or model unavailable
    Unavailable,
    /// Request rejected as invalid
    BadRequest,
    /// Response could not be parsed or was empty
    Malformed,
    /// Temporary server-side issue
    Transient,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Malformed => write!(f, "MALFORMED"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether another attempt against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Transient | Self::Malformed | Self::Unknown
        )
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// Recommendation provider failure with category and retry hint
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
    /// Provider-imposed wait before the next attempt (e.g. `Retry-After`)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn malformed(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::with_provider(ErrorCategory::Malformed, message, provider)
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status returned by a provider
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ProviderError {
        match status {
            429 => ProviderError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => ProviderError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => ProviderError::with_provider(ErrorCategory::BadRequest, message, provider),
            404 => ProviderError::with_provider(ErrorCategory::Unavailable, message, provider),
            408 | 500 | 502 | 503 | 504 => {
                ProviderError::with_provider(ErrorCategory::Transient, message, provider)
            }
            _ => ProviderError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> ProviderError {
        if let Some(status) = err.status() {
            return Self::classify_http_status(status.as_u16(), &err.to_string(), provider);
        }
        if err.is_decode() {
            return ProviderError::malformed(err.to_string(), provider);
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return ProviderError::with_provider(ErrorCategory::Network, err.to_string(), provider);
        }
        ProviderError::with_provider(ErrorCategory::Unknown, err.to_string(), provider)
    }
}

// =============================================================================
// Delivery Error
// =============================================================================

/// Channel send failure, surfaced once after the channel's own retries
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub transport: Transport,
    /// HTTP status when the transport answered
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}:{}] {}", self.transport, status, self.message),
            None => write!(f, "[{}] {}", self.transport, self.message),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl DeliveryError {
    pub fn new(transport: Transport, message: impl Into<String>) -> Self {
        Self {
            transport,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(transport: Transport, status: u16, message: impl Into<String>) -> Self {
        Self {
            transport,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Rate limits, server errors and connection failures are worth retrying
    pub fn is_transient(&self) -> bool {
        match self.status {
            Some(status) => status == 429 || status >= 500,
            None => true,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structured validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Field or component that failed validation
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn missing(field: &str) -> Self {
        Self::new(ValidationErrorKind::MissingField, "value is required").with_field(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingField,
    Format,
    Range,
    UnknownTenant,
    Unsupported,
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PulseError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Delivery error: {0}")]
    Delivery(DeliveryError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Validation(ValidationError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run 'bizpulse init' first")]
    NotInitialized,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ProviderError> for PulseError {
    fn from(err: ProviderError) -> Self {
        PulseError::Provider(err)
    }
}

impl From<DeliveryError> for PulseError {
    fn from(err: DeliveryError) -> Self {
        PulseError::Delivery(err)
    }
}

impl From<ValidationError> for PulseError {
    fn from(err: ValidationError) -> Self {
        PulseError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl PulseError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    pub fn validation(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(kind, message))
    }

    /// Short machine-readable label, used in history error details
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Database(_) | Self::Storage(_) | Self::NotInitialized => "storage",
            Self::Json(_) | Self::Yaml(_) => "serialization",
            Self::DataAccess(_) => "data_access",
            Self::Provider(_) => "provider",
            Self::Delivery(_) => "delivery",
            Self::Timeout { .. } => "timeout",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Lazy variant of [`ResultExt::with_context`]
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| PulseError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| PulseError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
