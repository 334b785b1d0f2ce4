//! WhatsApp Cloud API channel.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    DeliveryChannel, DeliveryConfirmation, RetryPolicy, build_client, send_chunked,
    transport_error, validate_api_base, validate_recipient,
};
use crate::config::WhatsAppConfig;
use crate::types::{DeliveryError, Result, Transport};

const TRANSPORT: Transport = Transport::WhatsApp;

pub struct WhatsAppChannel {
    api_token: SecretString,
    messages_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WhatsAppChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppChannel")
            .field("api_token", &"[REDACTED]")
            .field("messages_url", &self.messages_url)
            .finish()
    }
}

impl WhatsAppChannel {
    pub fn new(
        api_token: impl Into<String>,
        phone_number_id: &str,
        api_base: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let api_base = validate_api_base(Transport::WhatsApp, api_base)?;
        Ok(Self {
            api_token: SecretString::from(api_token.into()),
            messages_url: format!("{}/{}/{}/messages", api_base, api_version, phone_number_id),
            client: build_client(timeout)?,
            retry: RetryPolicy::default(),
        })
    }

    /// `None` unless both the token and the sender phone number id are set
    pub fn from_config(config: &WhatsAppConfig, timeout: Duration) -> Result<Option<Self>> {
        let token = config.api_token.as_deref().filter(|t| !t.trim().is_empty());
        let phone = config
            .phone_number_id
            .as_deref()
            .filter(|p| !p.trim().is_empty());

        match (token, phone) {
            (Some(token), Some(phone)) => Ok(Some(Self::new(
                token,
                phone,
                &config.api_base,
                &config.api_version,
                timeout,
            )?)),
            _ => Ok(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_text(&self, to: &str, body: String) -> std::result::Result<String, DeliveryError> {
        let request = MessageRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body: &body,
            },
        };

        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(TRANSPORT, &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(DeliveryError::with_status(TRANSPORT, status.as_u16(), message));
        }

        let body: MessageResponse = response.json().await.map_err(|e| {
            DeliveryError::with_status(
                TRANSPORT,
                status.as_u16(),
                format!("unreadable response: {}", e),
            )
        })?;

        body.messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| {
                DeliveryError::with_status(TRANSPORT, status.as_u16(), "response carried no message id")
            })
    }
}

#[async_trait]
impl DeliveryChannel for WhatsAppChannel {
    fn transport(&self) -> Transport {
        TRANSPORT
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryConfirmation> {
        let to = validate_recipient(TRANSPORT, recipient)?;
        debug!(to = %to, chars = message.chars().count(), "Sending WhatsApp message");

        let confirmation = send_chunked(TRANSPORT, &to, message, &self.retry, |chunk| {
            let to = to.clone();
            async move { self.send_text(&to, chunk).await }
        })
        .await?;

        info!(to = %to, chunks = confirmation.chunks, "WhatsApp message delivered");
        Ok(confirmation)
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    messaging_product: &'a str,
    recipient_type: &'a str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PulseError;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> WhatsAppChannel {
        WhatsAppChannel::new(
            "wa-token",
            "10987654321",
            &server.uri(),
            "v21.0",
            Duration::from_secs(5),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        })
    }

    fn accepted(id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "contacts": [{"input": "+237612345678", "wa_id": "237612345678"}],
            "messages": [{"id": id}]
        }))
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/10987654321/messages"))
            .and(header("authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "+237612345678",
                "type": "text",
                "text": {"preview_url": false, "body": "Hello"}
            })))
            .respond_with(accepted("wamid.ABC"))
            .expect(1)
            .mount(&server)
            .await;

        let confirmation = channel(&server)
            .send("+237 6 12 34 56 78", "Hello")
            .await
            .unwrap();
        assert_eq!(confirmation.recipient, "+237612345678");
        assert_eq!(confirmation.message_ids, vec!["wamid.ABC"]);
    }

    #[tokio::test]
    async fn test_retries_unavailable_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(accepted("wamid.RETRY"))
            .expect(1)
            .mount(&server)
            .await;

        let confirmation = channel(&server).send("+237612345678", "Hello").await.unwrap();
        assert_eq!(confirmation.message_ids, vec!["wamid.RETRY"]);
    }

    #[tokio::test]
    async fn test_rejected_number_surfaces_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Recipient phone number not in allowed list",
                    "type": "OAuthException",
                    "code": 131030
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        match channel(&server).send("+237612345678", "Hello").await {
            Err(PulseError::Delivery(e)) => {
                assert_eq!(e.status, Some(400));
                assert_eq!(e.message, "Recipient phone number not in allowed list");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_requires_phone_number_id() {
        let config = WhatsAppConfig {
            api_token: Some("wa-token".to_string()),
            phone_number_id: None,
            ..Default::default()
        };
        assert!(
            WhatsAppChannel::from_config(&config, Duration::from_secs(5))
                .unwrap()
                .is_none()
        );
    }
}
