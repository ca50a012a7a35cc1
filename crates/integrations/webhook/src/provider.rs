use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use faultline_core::ChannelKind;
use faultline_provider::{ChannelProvider, NotificationContext, ProviderError, ProviderResponse};

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::types::WebhookEnvelope;

/// Webhook channel that POSTs the alert envelope to the target URL.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new channel with the given configuration.
    ///
    /// Uses a default `reqwest::Client` with the configured timeout.
    pub fn new(config: WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    /// Create a channel with a custom HTTP client.
    ///
    /// Useful for testing or for sharing a connection pool.
    pub fn with_client(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn post(&self, url: &str, envelope: &WebhookEnvelope) -> Result<u16, WebhookError> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(envelope);

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            warn!(url, "webhook endpoint returned 429");
            return Err(WebhookError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(status.as_u16())
    }
}

#[async_trait]
impl ChannelProvider for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    #[instrument(skip(self, context), fields(alert_id = ?context.alert.id, rule_id = %context.rule.id))]
    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let envelope = WebhookEnvelope::from_context(context, Utc::now());
        debug!(url = target, "dispatching webhook");

        let status = self.post(target, &envelope).await?;
        Ok(ProviderResponse::success(
            serde_json::json!({ "statusCode": status }),
        ))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        // The webhook channel has no fixed endpoint to probe; targets are
        // per-rule. Constructing the client succeeded, so report healthy.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use faultline_core::{AlertPayload, AlertRule, Project, RuleKind, Severity};

    use super::*;

    /// A minimal mock HTTP server built on tokio that returns canned
    /// responses.
    struct MockServer {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}");
            Self { listener, base_url }
        }

        /// Accept one connection, respond with the given status and body,
        /// then shut down. Returns the raw request bytes.
        async fn respond_once(self, status_code: u16, body: &str) -> Vec<u8> {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut buf = vec![0u8; 32768];
            let n = stream.read(&mut buf).await.unwrap();
            buf.truncate(n);

            let response = format!(
                "HTTP/1.1 {status_code} OK\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            buf
        }
    }

    fn context() -> NotificationContext {
        let mut alert = AlertPayload::new(
            "API errors",
            "Detected 2 occurrences in the last 5 minutes (threshold 2).",
            Severity::High,
            "production".into(),
            Utc::now(),
        );
        alert.set_meta("reason", "threshold_exceeded");
        NotificationContext::new(
            Project::new("p1", "Checkout", "key", "salt"),
            AlertRule {
                id: "r1".into(),
                project_id: "p1".into(),
                name: "API errors".into(),
                kind: RuleKind::Threshold {
                    threshold: 2,
                    window_minutes: 5.0,
                },
                environments: Vec::new(),
                filter: None,
                channels: Vec::new(),
                cooldown_minutes: None,
                enabled: true,
                escalation: None,
            },
            alert,
        )
    }

    #[tokio::test]
    async fn notify_posts_json_envelope() {
        let server = MockServer::start().await;
        let channel = WebhookChannel::new(WebhookConfig::new());
        let url = server.base_url.clone();

        let server_handle =
            tokio::spawn(async move { server.respond_once(200, r#"{"ok":true}"#).await });

        let result = channel.notify(&context(), &url).await;
        let request = server_handle.await.unwrap();
        let request_str = String::from_utf8_lossy(&request);

        assert!(result.unwrap().is_success());
        assert!(request_str.starts_with("POST "));
        assert!(request_str.contains("content-type: application/json"));
        assert!(request_str.contains("threshold_exceeded"));
        assert!(request_str.contains("\"project\""));
        assert!(request_str.contains("\"links\""));
    }

    #[tokio::test]
    async fn non_2xx_is_an_error() {
        let server = MockServer::start().await;
        let channel = WebhookChannel::new(WebhookConfig::new());
        let url = server.base_url.clone();

        let server_handle =
            tokio::spawn(async move { server.respond_once(500, r#"{"error":"boom"}"#).await });

        let err = channel.notify(&context(), &url).await.unwrap_err();
        server_handle.await.unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_maps_to_retryable() {
        let server = MockServer::start().await;
        let channel = WebhookChannel::new(WebhookConfig::new());
        let url = server.base_url.clone();

        let server_handle = tokio::spawn(async move {
            server.respond_once(429, r#"{"error":"rate_limited"}"#).await
        });

        let err = channel.notify(&context(), &url).await.unwrap_err();
        server_handle.await.unwrap();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn custom_headers_are_sent() {
        let server = MockServer::start().await;
        let channel =
            WebhookChannel::new(WebhookConfig::new().with_header("X-Source", "faultline"));
        let url = server.base_url.clone();

        let server_handle = tokio::spawn(async move { server.respond_once(200, "{}").await });

        channel.notify(&context(), &url).await.unwrap();
        let request = server_handle.await.unwrap();
        let request_str = String::from_utf8_lossy(&request).to_lowercase();
        assert!(request_str.contains("x-source: faultline"));
    }
}
