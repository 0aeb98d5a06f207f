//! Telegram Bot API channel
//!
//! Delivers digests with `sendMessage`. Every request is a single attempt;
//! failures surface as [`ChannelError`] and are never retried here.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::{ChannelError, ChannelResult, Messenger};

/// Default Bot API base URL
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel configuration
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub token: String,
    /// API base URL, overridable for self-hosted Bot API servers
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TelegramConfig {
    /// Create a configuration for the public Bot API
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }

    /// Set the API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("Telegram token cannot be empty".to_string());
        }

        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err("Telegram API base must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Envelope of every Bot API answer
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram notification channel
///
/// # Request Format
///
/// ```json
/// {
///   "chat_id": 123456789,
///   "text": "✅ https://example.org/ (RU)",
///   "disable_web_page_preview": true
/// }
/// ```
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel
    pub fn new(config: TelegramConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create a channel for the public Bot API with just a token
    pub fn from_token(token: impl Into<String>) -> ChannelResult<Self> {
        Self::new(TelegramConfig::new(token))
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.token.trim()
        )
    }

    fn build_payload(recipient: i64, text: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": recipient,
            "text": text,
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl Messenger for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient: i64, text: &str) -> ChannelResult<()> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&Self::build_payload(recipient, text))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let api: Option<ApiResponse> = serde_json::from_str(&body).ok();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let description = api
                .and_then(|a| a.description)
                .unwrap_or_else(|| body.clone());
            return Err(ChannelError::RateLimited(description));
        }

        match api {
            Some(api) if status.is_success() && api.ok => {
                tracing::debug!(chat_id = recipient, "Telegram message delivered");
                Ok(())
            }
            Some(api) => Err(ChannelError::Rejected {
                status: api.error_code.unwrap_or(status.as_u16()),
                description: api
                    .description
                    .unwrap_or_else(|| "request not accepted".to_string()),
            }),
            None => Err(ChannelError::Rejected {
                status: status.as_u16(),
                description: format!("unexpected response body: {body}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(TelegramConfig::new("123:abc").with_api_base(server.uri())).unwrap()
    }

    #[test]
    fn test_telegram_config_validation() {
        assert!(TelegramConfig::new("123:abc").validate().is_ok());
        assert!(TelegramConfig::new("  ").validate().is_err());
        assert!(TelegramConfig::new("123:abc")
            .with_api_base("api.telegram.org")
            .validate()
            .is_err());
        assert!(TelegramConfig::new("123:abc").with_timeout(0).validate().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", TelegramConfig::new("123:secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_send_message_url() {
        let channel = TelegramChannel::new(
            TelegramConfig::new("123:abc").with_api_base("http://localhost:8081/"),
        )
        .unwrap();
        assert_eq!(
            channel.send_message_url(),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
        assert_eq!(channel.name(), "telegram");
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(serde_json::json!({
                "chat_id": 42,
                "text": "hello",
                "disable_web_page_preview": true,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        channel_for(&server).send(42, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let err = channel_for(&server).send(42, "hello").await.unwrap_err();
        match err {
            ChannelError::Rejected { status, description } => {
                assert_eq!(status, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ok_false_with_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "description": "nope"})),
            )
            .mount(&server)
            .await;

        assert!(channel_for(&server).send(1, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = channel_for(&server).send(1, "x").await.unwrap_err();
        assert!(matches!(err, ChannelError::RateLimited(_)));
    }
}
