//! Telegram Bot API channel.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    DeliveryChannel, DeliveryConfirmation, RetryPolicy, build_client, send_chunked,
    transport_error, validate_api_base, validate_recipient,
};
use crate::config::TelegramConfig;
use crate::types::{DeliveryError, Result, Transport};

const TRANSPORT: Transport = Transport::Telegram;

pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>, api_base: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            bot_token: SecretString::from(bot_token.into()),
            api_base: validate_api_base(Transport::Telegram, api_base)?,
            client: build_client(timeout)?,
            retry: RetryPolicy::default(),
        })
    }

    /// `None` when no bot token is configured
    pub fn from_config(config: &TelegramConfig, timeout: Duration) -> Result<Option<Self>> {
        match config.bot_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(Some(Self::new(token, &config.api_base, timeout)?)),
            None => Ok(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_text(&self, chat_id: &str, text: String) -> std::result::Result<String, DeliveryError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        );
        let request = SendMessageRequest {
            chat_id,
            text: &text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(TRANSPORT, &e.without_url()))?;

        let status = response.status().as_u16();
        let body: SendMessageResponse = response.json().await.map_err(|e| {
            DeliveryError::with_status(TRANSPORT, status, format!("unreadable response: {}", e))
        })?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result.message_id.to_string()),
            _ => Err(DeliveryError::with_status(
                TRANSPORT,
                body.error_code.unwrap_or(status),
                body.description
                    .unwrap_or_else(|| "request rejected".to_string()),
            )),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn transport(&self) -> Transport {
        TRANSPORT
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryConfirmation> {
        let chat_id = validate_recipient(TRANSPORT, recipient)?;
        debug!(chat_id = %chat_id, chars = message.chars().count(), "Sending Telegram message");

        let confirmation = send_chunked(TRANSPORT, &chat_id, message, &self.retry, |chunk| {
            let chat_id = chat_id.clone();
            async move { self.send_text(&chat_id, chunk).await }
        })
        .await?;

        info!(chat_id = %chat_id, chunks = confirmation.chunks, "Telegram message delivered");
        Ok(confirmation)
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    result: Option<SentMessage>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PulseError;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new("123:abc", &server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            })
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "@boulangerie",
                "disable_web_page_preview": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let confirmation = channel(&server)
            .send("@boulangerie", "Hello Boulangerie")
            .await
            .unwrap();
        assert_eq!(confirmation.transport, Transport::Telegram);
        assert_eq!(confirmation.message_ids, vec!["42"]);
        assert_eq!(confirmation.chunks, 1);
    }

    #[tokio::test]
    async fn test_rejected_chat_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        match channel(&server).send("-100123", "Hello").await {
            Err(PulseError::Delivery(e)) => {
                assert_eq!(e.status, Some(400));
                assert!(e.message.contains("chat not found"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "ok": false,
                "error_code": 502,
                "description": "Bad Gateway"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = channel(&server).send("12345", "Hello").await.unwrap_err();
        assert!(matches!(err, PulseError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_validation_error() {
        let server = MockServer::start().await;
        let err = channel(&server).send("not a chat", "Hello").await.unwrap_err();
        assert!(matches!(err, PulseError::Validation(_)));
    }
}
