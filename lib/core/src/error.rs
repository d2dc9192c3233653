use serde_json::{json, Value};
use thiserror::Error;

use crate::transport::TransportError;

/// Error types for the gateway client
///
/// These never reach the host directly: every public operation folds them
/// into an `error` result carrying [`GatewayError::raw_data`].
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request is missing data or carries values the processor would reject
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The processor could not be reached or did not answer in time
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The processor answered with a failure
    #[error("Processor returned HTTP {status}")]
    Processor { status: u16, body: Value },

    /// The processor answered with a body we can't interpret
    #[error("Malformed processor response: {reason}")]
    MalformedResponse { reason: String, body: Value },

    /// A request body could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl GatewayError {
    /// Short machine readable name of the failure
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Transport(_) => "transport",
            GatewayError::Processor { .. } => "processor",
            GatewayError::MalformedResponse { .. } => "malformed_response",
            GatewayError::Encoding(_) => "encoding",
        }
    }

    /// Diagnostic payload recorded in the host's gateway log
    pub fn raw_data(&self) -> Value {
        match self {
            GatewayError::Processor { status, body } => json!({
                "error": self.kind(),
                "http_status": status,
                "response": body,
            }),
            GatewayError::MalformedResponse { reason, body } => json!({
                "error": self.kind(),
                "message": reason,
                "response": body,
            }),
            _ => json!({
                "error": self.kind(),
                "message": self.to_string(),
            }),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(TransportError::from(err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Encoding(err.to_string())
    }
}
