use async_trait::async_trait;
use log::debug;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;

use super::{HttpMethod, ProcessorRequest, ProcessorResponse, ProcessorTransport, TransportError};
use crate::error::GatewayError;
use crate::models::Config;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// JSON over HTTP transport with basic auth
pub struct HttpTransport {
    client: reqwest::Client,
    config: Config,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url_for(&self, request: &ProcessorRequest) -> String {
        let base = self.config.base_url(request.credentials.test_mode);
        format!("{}{}", base.trim_end_matches('/'), request.path)
    }
}

#[async_trait]
impl ProcessorTransport for HttpTransport {
    async fn send(&self, request: &ProcessorRequest) -> Result<ProcessorResponse, TransportError> {
        let url = self.url_for(request);
        debug!("{:?} {} ({})", request.method, url, request.idempotency_key);

        let mut builder = match request.method {
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        builder = builder
            .basic_auth(
                &request.credentials.api_username,
                Some(request.credentials.api_password.expose_secret()),
            )
            .header(IDEMPOTENCY_KEY_HEADER, &request.idempotency_key)
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = match text.trim().is_empty() {
            true => Value::Null,
            false => serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text)),
        };

        Ok(ProcessorResponse { status, body })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_config(server: &MockServer) -> Config {
        Config {
            live_url: server.url("/live"),
            sandbox_url: server.url("/sandbox"),
            request_timeout_ms: 200,
            max_retries: 0,
            retry_backoff_ms: 0,
        }
    }

    fn credentials(test_mode: bool) -> Credentials {
        Credentials::new("user".to_string(), "pass".to_string(), test_mode)
    }

    #[tokio::test]
    async fn test_post_uses_sandbox_auth_and_idempotency_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sandbox/charges")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .header("idempotency-key", "capture-42")
                    .json_body(json!({"token": "abc", "amount": "10.00"}));
                then.status(200)
                    .json_body(json!({"success": true, "transaction_id": "ABC123"}));
            })
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let request = ProcessorRequest::new(
            HttpMethod::Post,
            "/charges",
            "capture-42",
            &credentials(true),
        )
        .with_body(json!({"token": "abc", "amount": "10.00"}));
        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(200, response.status);
        assert_eq!("ABC123", response.body["transaction_id"]);
    }

    #[tokio::test]
    async fn test_live_mode_delete_without_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/live/tokens/abc");
                then.status(204);
            })
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let request = ProcessorRequest::new(
            HttpMethod::Delete,
            "/tokens/abc",
            "vault-delete-abc",
            &credentials(false),
        );
        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(204, response.status);
        assert_eq!(Value::Null, response.body);
    }

    #[tokio::test]
    async fn test_non_json_body_is_kept_as_string() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/sandbox/refunds");
                then.status(502).body("Bad Gateway");
            })
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let request = ProcessorRequest::new(
            HttpMethod::Post,
            "/refunds",
            "refund-1",
            &credentials(true),
        );
        let response = transport.send(&request).await.unwrap();

        assert_eq!(502, response.status);
        assert_eq!(json!("Bad Gateway"), response.body);
    }

    #[tokio::test]
    async fn test_slow_processor_maps_to_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/sandbox/charges");
                then.status(200)
                    .delay(Duration::from_millis(1_000))
                    .json_body(json!({"success": true}));
            })
            .await;

        let transport = HttpTransport::new(&test_config(&server)).unwrap();
        let request = ProcessorRequest::new(
            HttpMethod::Post,
            "/charges",
            "capture-7",
            &credentials(true),
        );
        let err = transport.send(&request).await.unwrap_err();

        assert_eq!(TransportError::Timeout, err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_processor_is_retryable() {
        let config = Config {
            live_url: "http://127.0.0.1:9".to_string(),
            sandbox_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
            max_retries: 0,
            retry_backoff_ms: 0,
        };
        let transport = HttpTransport::new(&config).unwrap();
        let request = ProcessorRequest::new(
            HttpMethod::Post,
            "/tokens",
            "vault-create-1",
            &credentials(false),
        );
        let err = transport.send(&request).await.unwrap_err();

        assert!(err.is_retryable());
    }
}
