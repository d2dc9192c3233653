pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::Credentials;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
}

/// A single call against the processor API
#[derive(Clone, Debug)]
pub struct ProcessorRequest {
    pub method: HttpMethod,
    /// Path relative to the processor base URL, e.g. `/charges`
    pub path: String,
    /// Sent as the `Idempotency-Key` header. Every retry of the same logical
    /// operation carries the same key.
    pub idempotency_key: String,
    pub body: Option<Value>,
    pub credentials: Credentials,
}

impl ProcessorRequest {
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        idempotency_key: impl Into<String>,
        credentials: &Credentials,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            idempotency_key: idempotency_key.into(),
            body: None,
            credentials: credentials.clone(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and decoded body of a processor reply
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorResponse {
    pub status: u16,
    /// JSON body; a non-JSON body is kept as a JSON string, an empty one as null
    pub body: Value,
}

impl ProcessorResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Failures after which the outcome at the processor is unknown and a
    /// replay under the same idempotency key is safe
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

/// Trait for the channel that carries requests to the processor
#[async_trait]
pub trait ProcessorTransport: Send + Sync {
    async fn send(&self, request: &ProcessorRequest) -> Result<ProcessorResponse, TransportError>;
}
