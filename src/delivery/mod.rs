//! Delivery Channels
//!
//! Sends formatted digests through a named transport. Each channel splits
//! long messages, retries transient failures internally with exponential
//! backoff, and surfaces a single [`DeliveryError`] when it gives up.

pub mod formatter;
mod telegram;
mod whatsapp;

pub use formatter::{DigestInput, MessageFormatter, split_message};
pub use telegram::TelegramChannel;
pub use whatsapp::WhatsAppChannel;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::DeliveryConfig;
use crate::constants::delivery as delivery_constants;
use crate::types::{
    DeliveryError, Result, Transport, ValidationError, ValidationErrorKind,
};

/// Proof of a completed send
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryConfirmation {
    pub transport: Transport,
    pub recipient: String,
    /// One transport message id per chunk, in send order
    pub message_ids: Vec<String>,
    pub chunks: usize,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn transport(&self) -> Transport;

    /// Send `message` to `recipient`, chunked to the transport limit
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryConfirmation>;
}

pub type SharedChannel = Arc<dyn DeliveryChannel>;

// =============================================================================
// Recipient validation
// =============================================================================

fn invalid_recipient(transport: Transport, recipient: &str, expected: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::Format,
        format!(
            "'{}' is not a valid {} recipient (expected {})",
            recipient, transport, expected
        ),
    )
    .with_field("recipient")
}

/// Check a recipient address for `transport` and return its normalized form
pub fn validate_recipient(
    transport: Transport,
    recipient: &str,
) -> std::result::Result<String, ValidationError> {
    let trimmed = recipient.trim();
    match transport {
        Transport::Telegram => {
            let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
            let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
            let handle = trimmed
                .strip_prefix('@')
                .is_some_and(|name| {
                    name.len() >= 5 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                });
            if numeric || handle {
                Ok(trimmed.to_string())
            } else {
                Err(invalid_recipient(
                    transport,
                    recipient,
                    "a numeric chat id or @channel",
                ))
            }
        }
        Transport::WhatsApp => {
            let compact: String = trimmed
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            let valid = compact.strip_prefix('+').is_some_and(|digits| {
                (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
            });
            if valid {
                Ok(compact)
            } else {
                Err(invalid_recipient(
                    transport,
                    recipient,
                    "an international number such as +237612345678",
                ))
            }
        }
    }
}

// =============================================================================
// Shared send machinery
// =============================================================================

/// Backoff for transient send failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: delivery_constants::MAX_RETRIES,
            base_delay: Duration::from_millis(delivery_constants::BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_times(self.max_retries)
    }
}

/// Run `op` with retries on transient errors
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    transport: Transport,
    op: F,
) -> std::result::Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DeliveryError>>,
{
    op.retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(|e: &DeliveryError| e.is_transient())
        .notify(|e: &DeliveryError, wait: Duration| {
            warn!(transport = %transport, error = %e, ?wait, "Send failed, retrying");
        })
        .await
}

/// Send every chunk of `message` in order through `send_chunk`
pub(crate) async fn send_chunked<F, Fut>(
    transport: Transport,
    recipient: &str,
    message: &str,
    policy: &RetryPolicy,
    mut send_chunk: F,
) -> Result<DeliveryConfirmation>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::result::Result<String, DeliveryError>>,
{
    let chunks = split_message(message, delivery_constants::MAX_MESSAGE_CHARS);
    if chunks.is_empty() {
        return Err(DeliveryError::new(transport, "refusing to send an empty message").into());
    }

    let mut message_ids = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let id = with_retry(policy, transport, || send_chunk(chunk.clone())).await?;
        message_ids.push(id);
    }

    Ok(DeliveryConfirmation {
        transport,
        recipient: recipient.to_string(),
        message_ids,
        chunks: chunks.len(),
        sent_at: Utc::now(),
    })
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(
            crate::constants::network::CONNECTION_TIMEOUT_SECS,
        ))
        .build()
        .map_err(|e| crate::types::PulseError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Parse a transport API base URL, rejecting anything but http(s)
pub(crate) fn validate_api_base(transport: Transport, raw: &str) -> Result<String> {
    let url = url::Url::parse(raw).map_err(|e| {
        crate::types::PulseError::Config(format!(
            "Invalid {} API base URL '{}': {}",
            transport, raw, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(crate::types::PulseError::Config(format!(
            "{} API base must use http or https, got: {}",
            transport,
            url.scheme()
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

/// Map a reqwest transport failure; no status means it is retried
pub(crate) fn transport_error(transport: Transport, err: &reqwest::Error) -> DeliveryError {
    match err.status() {
        Some(status) => DeliveryError::with_status(transport, status.as_u16(), err.to_string()),
        None => DeliveryError::new(transport, err.to_string()),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Configured channels by transport
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<Transport, SharedChannel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels with complete credentials; others are left out
    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let mut registry = Self::new();
        let timeout = Duration::from_secs(config.timeout_secs);

        if let Some(channel) = TelegramChannel::from_config(&config.telegram, timeout)? {
            registry.register(Arc::new(channel));
        }
        if let Some(channel) = WhatsAppChannel::from_config(&config.whatsapp, timeout)? {
            registry.register(Arc::new(channel));
        }
        Ok(registry)
    }

    pub fn register(&mut self, channel: SharedChannel) {
        self.channels.insert(channel.transport(), channel);
    }

    pub fn get(&self, transport: Transport) -> Option<SharedChannel> {
        self.channels.get(&transport).cloned()
    }

    pub fn is_configured(&self, transport: Transport) -> bool {
        self.channels.contains_key(&transport)
    }

    pub fn transports(&self) -> Vec<Transport> {
        let mut transports: Vec<Transport> = self.channels.keys().copied().collect();
        transports.sort_by_key(|t| t.as_str());
        transports
    }
}
