pub mod error;
pub mod events;
pub mod gateway_builder;
pub mod host;
mod logger;
pub mod models;
mod processor;
pub mod transport;

use async_trait::async_trait;
use error::GatewayError;
use log::{debug, error, info, warn};
use models::{
    AdminStatusMessage, CaptureRequest, CaptureResult, Config, ConfigField, ConfigFieldType,
    Credentials, MessageKind, ModuleMetadata, Operation, OperationResult, PayMethod,
    PaymentSource, RefundRequest, RefundResult, RemoteToken, ResultStatus, StoreRemoteAction,
    StoreRemoteRequest, StoreRemoteResult, API_VERSION, DISPLAY_NAME,
};
use processor::{
    classify, expect_approved, token_path, ChargeBody, RefundBody, Reply, VaultCardBody,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use transport::{HttpMethod, ProcessorRequest, ProcessorResponse, ProcessorTransport};

// Export the events module for external use
pub use events::{EventEmitter, EventListener, GatewayEvent};

// Export the builder module
pub use gateway_builder::GatewayBuilder;

/// The callbacks a billing host invokes on a tokenizing gateway module
#[async_trait]
pub trait TokenGateway: Send + Sync {
    /// Module capabilities
    fn metadata(&self) -> ModuleMetadata;

    /// Fields of the configuration form the host renders
    fn config_fields(&self) -> Vec<ConfigField>;

    /// Creates, updates or deletes a vaulted card
    async fn store_remote(&self, request: StoreRemoteRequest) -> StoreRemoteResult;

    /// Charges a token, tokenizing the pay method first when there is none
    async fn capture(&self, request: CaptureRequest) -> CaptureResult;

    /// Reverses a prior transaction
    async fn refund(&self, request: RefundRequest) -> RefundResult;

    /// Status line shown in the admin area. Local only, no processor call.
    fn describe_token(&self, token: Option<&RemoteToken>) -> Option<AdminStatusMessage>;
}

/// Gateway client translating host requests into processor calls
#[derive(Clone)]
pub struct GatewayClient {
    config: Config,
    transport: Arc<dyn ProcessorTransport>,
    event_emitter: Arc<EventEmitter>,
}

impl GatewayClient {
    /// Creates a new instance of the `GatewayClient`
    ///
    /// # Arguments
    ///
    /// * `config` - Processor endpoints, timeout and retry policy
    /// * `transport` - Channel used to reach the processor
    pub fn new(config: Config, transport: Arc<dyn ProcessorTransport>) -> Self {
        Self {
            config,
            transport,
            event_emitter: Arc::new(EventEmitter::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a listener to receive gateway events
    ///
    /// # Returns
    ///
    /// A unique identifier for the listener, which can be used to remove it later
    pub fn add_event_listener(&self, listener: Box<dyn EventListener>) -> String {
        self.event_emitter.add_listener(listener)
    }

    /// Removes a previously registered event listener
    ///
    /// # Returns
    ///
    /// `true` if the listener was found and removed, `false` otherwise
    pub fn remove_event_listener(&self, id: &str) -> bool {
        self.event_emitter.remove_listener(id)
    }

    /// Sends a request, replaying it under the same idempotency key after a
    /// transport failure or a 502/503/504
    async fn send(&self, request: &ProcessorRequest) -> Result<ProcessorResponse, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.transport.send(request).await;
            let retryable = match &outcome {
                Ok(response) => matches!(response.status, 502..=504),
                Err(e) => e.is_retryable(),
            };
            if !retryable || attempt >= self.config.max_retries {
                return outcome.map_err(GatewayError::from);
            }

            attempt += 1;
            warn!(
                "Processor call {} failed ({}), retry {}/{}",
                request.idempotency_key,
                match &outcome {
                    Ok(response) => format!("HTTP {}", response.status),
                    Err(e) => e.to_string(),
                },
                attempt,
                self.config.max_retries
            );
            tokio::time::sleep(Duration::from_millis(
                self.config.retry_backoff_ms * u64::from(attempt),
            ))
            .await;
        }
    }

    /// Submits card data to the vault and returns the issued token with the raw reply
    async fn vault(&self, request: ProcessorRequest) -> Result<(RemoteToken, Value), GatewayError> {
        let response = self.send(&request).await?;
        let reply = expect_approved(&response)?;
        let token = reply
            .remote_token()
            .ok_or_else(|| GatewayError::MalformedResponse {
                reason: "vault reply carries no token".to_string(),
                body: response.body.clone(),
            })?;

        Ok((token, response.body))
    }

    fn vault_request(
        &self,
        method: HttpMethod,
        path: String,
        idempotency_key: String,
        credentials: &Credentials,
        pay_method: &PayMethod,
        token: Option<&RemoteToken>,
    ) -> Result<ProcessorRequest, GatewayError> {
        pay_method.validate()?;
        let body = serde_json::to_value(VaultCardBody::new(pay_method, token))?;
        Ok(ProcessorRequest::new(method, path, idempotency_key, credentials).with_body(body))
    }

    async fn store_remote_internal(
        &self,
        request: &StoreRemoteRequest,
    ) -> Result<StoreRemoteResult, GatewayError> {
        let credentials = &request.credentials;
        match &request.action {
            StoreRemoteAction::Create { pay_method } => {
                let key = format!("vault-create-{}", uuid::Uuid::new_v4());
                let vault_request = self.vault_request(
                    HttpMethod::Post,
                    "/tokens".to_string(),
                    key,
                    credentials,
                    pay_method,
                    None,
                )?;
                let (token, raw_data) = self.vault(vault_request).await?;
                info!("Stored card ending {} as {token}", pay_method.last4());
                Ok(StoreRemoteResult::Success {
                    gateway_id: Some(token),
                    raw_data,
                })
            }
            StoreRemoteAction::Update { token, pay_method } => {
                let key = format!("vault-update-{token}-{}", uuid::Uuid::new_v4());
                let vault_request = self.vault_request(
                    HttpMethod::Put,
                    token_path(token)?,
                    key,
                    credentials,
                    pay_method,
                    Some(token),
                )?;
                let (new_token, raw_data) = self.vault(vault_request).await?;
                info!("Updated token {token}, processor now holds {new_token}");
                Ok(StoreRemoteResult::Success {
                    gateway_id: Some(new_token),
                    raw_data,
                })
            }
            StoreRemoteAction::Delete { token } => {
                let delete_request = ProcessorRequest::new(
                    HttpMethod::Delete,
                    token_path(token)?,
                    format!("vault-delete-{token}"),
                    credentials,
                );
                let response = self.send(&delete_request).await?;
                // A replayed delete finds the token already gone
                if response.status == 404 || (response.is_success() && response.body.is_null()) {
                    info!("Token {token} removed (HTTP {})", response.status);
                } else {
                    expect_approved(&response)?;
                }
                Ok(StoreRemoteResult::Success {
                    gateway_id: None,
                    raw_data: response.body,
                })
            }
        }
    }

    async fn capture_internal(
        &self,
        request: &CaptureRequest,
    ) -> Result<CaptureResult, GatewayError> {
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "capture amount must be positive, got {}",
                request.amount
            )));
        }
        if request.invoice_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "capture needs an invoice id".to_string(),
            ));
        }

        let (token, tokenized) = match &request.source {
            PaymentSource::Token(token) => (token.clone(), false),
            PaymentSource::PayMethod(pay_method) => {
                // Card stored by the host without a token: vault it, then charge
                info!(
                    "No token for invoice {}, tokenizing card ending {}",
                    request.invoice_id,
                    pay_method.last4()
                );
                let vault_request = self.vault_request(
                    HttpMethod::Post,
                    "/tokens".to_string(),
                    tokenize_key(&request.invoice_id, pay_method),
                    &request.credentials,
                    pay_method,
                    None,
                )?;
                let (token, raw_data) = self.vault(vault_request).await?;
                debug!("Tokenize reply for invoice {}: {raw_data}", request.invoice_id);
                (token, true)
            }
        };

        let body = serde_json::to_value(ChargeBody::new(&token, request))?;
        let charge_request = ProcessorRequest::new(
            HttpMethod::Post,
            "/charges",
            format!("capture-{}-{token}", request.invoice_id),
            &request.credentials,
        )
        .with_body(body);
        let response = self.send(&charge_request).await?;

        match classify(&response, true)? {
            Reply::Approved(reply) => {
                let transaction_id = reply
                    .transaction_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| GatewayError::MalformedResponse {
                        reason: "approved charge carries no transaction_id".to_string(),
                        body: response.body.clone(),
                    })?;
                let gateway_id = reply
                    .remote_token()
                    .or_else(|| tokenized.then_some(token));

                Ok(CaptureResult::Success {
                    transaction_id,
                    fee: reply.fee,
                    gateway_id,
                    raw_data: response.body,
                })
            }
            Reply::Declined(decline_reason) => Ok(CaptureResult::Declined {
                decline_reason,
                raw_data: response.body,
            }),
        }
    }

    async fn refund_internal(&self, request: &RefundRequest) -> Result<RefundResult, GatewayError> {
        if request.transaction_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "refund needs the transaction id to reverse".to_string(),
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "refund amount must be positive, got {}",
                request.amount
            )));
        }

        let body = serde_json::to_value(RefundBody::new(request))?;
        let refund_request = ProcessorRequest::new(
            HttpMethod::Post,
            "/refunds",
            format!("refund-{}-{}", request.transaction_id, request.amount),
            &request.credentials,
        )
        .with_body(body);
        let response = self.send(&refund_request).await?;

        match classify(&response, true)? {
            Reply::Approved(reply) => {
                let transaction_id = reply
                    .transaction_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| GatewayError::MalformedResponse {
                        reason: "approved refund carries no transaction_id".to_string(),
                        body: response.body.clone(),
                    })?;

                Ok(RefundResult::Success {
                    transaction_id,
                    fee: reply.fee,
                    raw_data: response.body,
                })
            }
            Reply::Declined(decline_reason) => Ok(RefundResult::Declined {
                decline_reason,
                raw_data: response.body,
            }),
        }
    }

    /// Logs the outcome and publishes it to event listeners
    fn complete<R: OperationResult>(&self, operation: Operation, result: R) -> R {
        let status = result.status();
        match status {
            ResultStatus::Success => info!("{operation} succeeded"),
            ResultStatus::Declined => warn!("{operation} declined: {}", result.raw_data()),
            ResultStatus::Error => error!("{operation} failed: {}", result.raw_data()),
        }
        self.event_emitter.emit(&GatewayEvent::OperationCompleted {
            operation,
            status,
            raw_data: result.raw_data().clone(),
        });
        result
    }

    /// Configures a global logger that writes to `gateway.log` and forwards log
    /// events to an optional application-specific logger.
    ///
    /// It must be called only once in the application lifecycle. If the
    /// application already uses a globally-registered logger, this method
    /// shouldn't be called at all.
    ///
    /// ### Errors
    ///
    /// An error is returned if the log file cannot be created or if a global
    /// logger is already configured.
    pub fn init_logging(
        log_dir: &str,
        app_logger: Option<Box<dyn log::Log>>,
    ) -> anyhow::Result<()> {
        crate::logger::GatewayLogger::init(log_dir, app_logger)
    }
}

/// Idempotency key for vaulting a card during capture. A different card
/// entered for the same invoice gets its own key.
fn tokenize_key(invoice_id: &str, pay_method: &PayMethod) -> String {
    format!(
        "tokenize-{invoice_id}-{}-{}{}",
        pay_method.last4(),
        pay_method.expiry.month_str(),
        pay_method.expiry.year_str()
    )
}

#[async_trait]
impl TokenGateway for GatewayClient {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            display_name: DISPLAY_NAME.to_string(),
            api_version: API_VERSION.to_string(),
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "FriendlyName".to_string(),
                friendly_name: None,
                field_type: ConfigFieldType::System,
                size: None,
                default: None,
                description: None,
                value: Some(DISPLAY_NAME.to_string()),
            },
            ConfigField {
                name: "apiUsername".to_string(),
                friendly_name: Some("API Username".to_string()),
                field_type: ConfigFieldType::Text,
                size: Some("25".to_string()),
                default: Some(String::new()),
                description: Some("Enter your API Username here".to_string()),
                value: None,
            },
            ConfigField {
                name: "apiPassword".to_string(),
                friendly_name: Some("API Password".to_string()),
                field_type: ConfigFieldType::Password,
                size: Some("25".to_string()),
                default: Some(String::new()),
                description: Some("Enter your API Password here".to_string()),
                value: None,
            },
            ConfigField {
                name: "testMode".to_string(),
                friendly_name: Some("Test Mode".to_string()),
                field_type: ConfigFieldType::YesNo,
                size: None,
                default: None,
                description: Some("Tick to enable test mode".to_string()),
                value: None,
            },
        ]
    }

    async fn store_remote(&self, request: StoreRemoteRequest) -> StoreRemoteResult {
        info!("Store remote: {}", request.action.name());
        let result = match self.store_remote_internal(&request).await {
            Ok(result) => result,
            Err(e) => StoreRemoteResult::Error {
                raw_data: e.raw_data(),
            },
        };
        self.complete(Operation::StoreRemote, result)
    }

    async fn capture(&self, request: CaptureRequest) -> CaptureResult {
        info!(
            "Capturing {} {} for invoice {}",
            request.amount, request.currency, request.invoice_id
        );
        let result = match self.capture_internal(&request).await {
            Ok(result) => result,
            Err(e) => CaptureResult::Error {
                raw_data: e.raw_data(),
            },
        };
        self.complete(Operation::Capture, result)
    }

    async fn refund(&self, request: RefundRequest) -> RefundResult {
        info!(
            "Refunding {} {} of transaction {}",
            request.amount, request.currency, request.transaction_id
        );
        let result = match self.refund_internal(&request).await {
            Ok(result) => result,
            Err(e) => RefundResult::Error {
                raw_data: e.raw_data(),
            },
        };
        self.complete(Operation::Refund, result)
    }

    fn describe_token(&self, token: Option<&RemoteToken>) -> Option<AdminStatusMessage> {
        token.map(|token| AdminStatusMessage {
            kind: MessageKind::Info,
            title: "Token Gateway Profile".to_string(),
            msg: format!(
                "This customer has a Remote Token storing their card details for automated \
                 recurring billing with ID {token}"
            ),
        })
    }
}
