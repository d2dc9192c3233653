use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

pub const DISPLAY_NAME: &str = "Sample Tokenisation Gateway Module";
pub const API_VERSION: &str = "1.1";

/// Processor-level configuration for the gateway client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the live processor API
    pub live_url: String,
    /// Base URL of the sandbox processor API, used when test mode is on
    pub sandbox_url: String,
    /// Timeout applied to every single processor request
    pub request_timeout_ms: u64,
    /// Extra attempts after a transport failure or a 502/503/504
    pub max_retries: u32,
    /// Backoff step between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Config {
    /// Creates a configuration pointing at the default processor endpoints
    ///
    /// # Returns
    ///
    /// A new `Config` instance with default timeouts and retry policy
    pub fn default_config() -> Self {
        Self {
            live_url: "https://api.tokengateway.example/v1".to_string(),
            sandbox_url: "https://sandbox.tokengateway.example/v1".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }

    /// The base URL matching the given test mode flag
    pub fn base_url(&self, test_mode: bool) -> &str {
        match test_mode {
            true => &self.sandbox_url,
            false => &self.live_url,
        }
    }
}

/// Gateway settings the host passes into every operation
#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_username: String,
    pub api_password: SecretString,
    pub test_mode: bool,
}

impl Credentials {
    pub fn new(api_username: String, api_password: String, test_mode: bool) -> Self {
        Self {
            api_username,
            api_password: SecretString::from(api_password),
            test_mode,
        }
    }
}

/// Opaque token issued by the processor in place of card data
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteToken(String);

impl RemoteToken {
    pub fn parse(token: impl Into<String>) -> Result<Self, GatewayError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "remote token must not be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RemoteToken {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO-4217 alphabetic currency code
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid currency code: {s}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card month/year pair as supplied by the host in `mmyy` form
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardDate {
    pub month: u8,
    pub year: u8,
}

impl CardDate {
    /// Two digit month, e.g. "04"
    pub fn month_str(&self) -> String {
        format!("{:02}", self.month)
    }

    /// Two digit year, e.g. "27"
    pub fn year_str(&self) -> String {
        format!("{:02}", self.year)
    }
}

impl FromStr for CardDate {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| !matches!(c, '/' | ' ')).collect();
        let invalid =
            || GatewayError::InvalidRequest(format!("invalid card date (expected mmyy): {s}"));
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let month: u8 = digits[..2].parse().map_err(|_| invalid())?;
        let year: u8 = digits[2..].parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { month, year })
    }
}

/// Billing contact attached to a pay method
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    pub phone: String,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Raw card data entered by the end user. Lives only for the duration of a call.
#[derive(Clone, Debug)]
pub struct PayMethod {
    pub card_type: String,
    pub card_number: SecretString,
    pub expiry: CardDate,
    pub start: Option<CardDate>,
    pub issue_number: Option<String>,
    pub cvv: Option<SecretString>,
    pub contact: Contact,
}

impl PayMethod {
    /// Card number with spaces and dashes removed
    pub(crate) fn normalized_card_number(&self) -> String {
        self.card_number
            .expose_secret()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    pub fn last4(&self) -> String {
        let number: Vec<char> = self.normalized_card_number().chars().collect();
        number[number.len().saturating_sub(4)..].iter().collect()
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let number = self.normalized_card_number();
        if !(12..=19).contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::InvalidRequest(
                "card number must contain 12 to 19 digits".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the vault should do with a stored card
#[derive(Clone, Debug)]
pub enum StoreRemoteAction {
    /// A new card is added
    Create { pay_method: PayMethod },
    /// An existing card is replaced
    Update {
        token: RemoteToken,
        pay_method: PayMethod,
    },
    /// A stored card is removed
    Delete { token: RemoteToken },
}

impl StoreRemoteAction {
    pub fn name(&self) -> &'static str {
        match self {
            StoreRemoteAction::Create { .. } => "create",
            StoreRemoteAction::Update { .. } => "update",
            StoreRemoteAction::Delete { .. } => "delete",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreRemoteRequest {
    pub credentials: Credentials,
    pub action: StoreRemoteAction,
}

/// Where the funds for a capture come from
#[derive(Clone, Debug)]
pub enum PaymentSource {
    /// A previously vaulted card
    Token(RemoteToken),
    /// A card stored by the host that has no token yet
    PayMethod(PayMethod),
}

#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub credentials: Credentials,
    pub source: PaymentSource,
    /// Present only for card holder present transactions
    pub cvv: Option<SecretString>,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub invoice_id: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RefundRequest {
    pub credentials: Credentials,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub token: Option<RemoteToken>,
}

/// Outcome tier shared by all mutating operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Declined,
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::Declined => write!(f, "declined"),
            ResultStatus::Error => write!(f, "error"),
        }
    }
}

/// Common view over operation results, used for audit events
pub trait OperationResult {
    fn status(&self) -> ResultStatus;
    fn raw_data(&self) -> &Value;
}

/// Result of a store-remote call, serialized as the host's flat result bag
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StoreRemoteResult {
    Success {
        /// Token the host should store. Absent for deletes.
        #[serde(rename = "gatewayid", skip_serializing_if = "Option::is_none")]
        gateway_id: Option<RemoteToken>,
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
    Error {
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
}

impl OperationResult for StoreRemoteResult {
    fn status(&self) -> ResultStatus {
        match self {
            StoreRemoteResult::Success { .. } => ResultStatus::Success,
            StoreRemoteResult::Error { .. } => ResultStatus::Error,
        }
    }

    fn raw_data(&self) -> &Value {
        match self {
            StoreRemoteResult::Success { raw_data, .. } | StoreRemoteResult::Error { raw_data } => {
                raw_data
            }
        }
    }
}

/// Result of a capture call, serialized as the host's flat result bag
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaptureResult {
    Success {
        #[serde(rename = "transid")]
        transaction_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fee: Option<Decimal>,
        /// Set when the token was created or rotated during the capture
        #[serde(rename = "gatewayid", skip_serializing_if = "Option::is_none")]
        gateway_id: Option<RemoteToken>,
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
    Declined {
        #[serde(rename = "declinereason")]
        decline_reason: String,
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
    Error {
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
}

impl OperationResult for CaptureResult {
    fn status(&self) -> ResultStatus {
        match self {
            CaptureResult::Success { .. } => ResultStatus::Success,
            CaptureResult::Declined { .. } => ResultStatus::Declined,
            CaptureResult::Error { .. } => ResultStatus::Error,
        }
    }

    fn raw_data(&self) -> &Value {
        match self {
            CaptureResult::Success { raw_data, .. }
            | CaptureResult::Declined { raw_data, .. }
            | CaptureResult::Error { raw_data } => raw_data,
        }
    }
}

/// Result of a refund call, serialized as the host's flat result bag
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RefundResult {
    Success {
        /// Transaction id of the refund itself
        #[serde(rename = "transid")]
        transaction_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fee: Option<Decimal>,
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
    Declined {
        #[serde(rename = "declinereason")]
        decline_reason: String,
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
    Error {
        #[serde(rename = "rawdata")]
        raw_data: Value,
    },
}

impl OperationResult for RefundResult {
    fn status(&self) -> ResultStatus {
        match self {
            RefundResult::Success { .. } => ResultStatus::Success,
            RefundResult::Declined { .. } => ResultStatus::Declined,
            RefundResult::Error { .. } => ResultStatus::Error,
        }
    }

    fn raw_data(&self) -> &Value {
        match self {
            RefundResult::Success { raw_data, .. }
            | RefundResult::Declined { raw_data, .. }
            | RefundResult::Error { raw_data } => raw_data,
        }
    }
}

/// Operations that reach the processor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    StoreRemote,
    Capture,
    Refund,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::StoreRemote => write!(f, "storeremote"),
            Operation::Capture => write!(f, "capture"),
            Operation::Refund => write!(f, "refund"),
        }
    }
}

/// Module capabilities reported to the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleMetadata {
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "APIVersion")]
    pub api_version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    #[serde(rename = "System")]
    System,
    Text,
    Password,
    YesNo,
}

/// One entry of the configuration form the host renders
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigField {
    #[serde(skip)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(rename = "Type")]
    pub field_type: ConfigFieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

/// Message shown next to an invoice in the admin area
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdminStatusMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub title: String,
    pub msg: String,
}
