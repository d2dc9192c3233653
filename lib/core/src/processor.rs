//! Wire format of the processor API: request bodies and reply classification.

use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{CaptureRequest, PayMethod, RefundRequest, RemoteToken};
use crate::transport::ProcessorResponse;

pub(crate) const DEFAULT_DECLINE_REASON: &str = "Payment declined by processor";

/// Card fields submitted to the vault on create and update
#[derive(Debug, Serialize)]
pub(crate) struct VaultCardBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    card_type: &'a str,
    card_number: String,
    card_expiry_month: String,
    card_expiry_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_cvv: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_start_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_start_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_issue_number: Option<&'a str>,
    card_holder_name: String,
    card_holder_address1: &'a str,
    card_holder_address2: &'a str,
    card_holder_city: &'a str,
    card_holder_state: &'a str,
    card_holder_zip: &'a str,
    card_holder_country: &'a str,
    card_holder_email: &'a str,
    card_holder_phone: &'a str,
}

impl<'a> VaultCardBody<'a> {
    pub(crate) fn new(pay_method: &'a PayMethod, token: Option<&'a RemoteToken>) -> Self {
        let contact = &pay_method.contact;
        Self {
            token: token.map(RemoteToken::as_str),
            card_type: &pay_method.card_type,
            card_number: pay_method.normalized_card_number(),
            card_expiry_month: pay_method.expiry.month_str(),
            card_expiry_year: pay_method.expiry.year_str(),
            card_cvv: pay_method.cvv.as_ref().map(|cvv| cvv.expose_secret()),
            card_start_month: pay_method.start.map(|start| start.month_str()),
            card_start_year: pay_method.start.map(|start| start.year_str()),
            card_issue_number: pay_method.issue_number.as_deref(),
            card_holder_name: contact.full_name(),
            card_holder_address1: &contact.address1,
            card_holder_address2: &contact.address2,
            card_holder_city: &contact.city,
            card_holder_state: &contact.state,
            card_holder_zip: &contact.postcode,
            card_holder_country: &contact.country,
            card_holder_email: &contact.email,
            card_holder_phone: &contact.phone,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChargeBody<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cvv: Option<&'a str>,
    invoice_number: &'a str,
    amount: Decimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> ChargeBody<'a> {
    pub(crate) fn new(token: &'a RemoteToken, request: &'a CaptureRequest) -> Self {
        Self {
            token: token.as_str(),
            cvv: request.cvv.as_ref().map(|cvv| cvv.expose_secret()),
            invoice_number: &request.invoice_id,
            amount: request.amount,
            currency: request.currency.as_str(),
            description: request.description.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RefundBody<'a> {
    transaction_id: &'a str,
    amount: Decimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

impl<'a> RefundBody<'a> {
    pub(crate) fn new(request: &'a RefundRequest) -> Self {
        Self {
            transaction_id: &request.transaction_id,
            amount: request.amount,
            currency: request.currency.as_str(),
            token: request.token.as_ref().map(RemoteToken::as_str),
        }
    }
}

/// Reply body shared by every processor endpoint
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProcessorReply {
    #[serde(default)]
    pub success: bool,
    pub token: Option<String>,
    pub transaction_id: Option<String>,
    pub fee: Option<Decimal>,
    pub decline_reason: Option<String>,
}

impl ProcessorReply {
    /// Token carried by the reply, ignoring empty strings
    pub(crate) fn remote_token(&self) -> Option<RemoteToken> {
        self.token
            .as_deref()
            .and_then(|token| RemoteToken::parse(token).ok())
    }
}

#[derive(Debug)]
pub(crate) enum Reply {
    Approved(ProcessorReply),
    Declined(String),
}

/// Sorts a processor reply into approved, declined or failed.
///
/// Declines are only recognised when `allow_decline` is set; the vault
/// endpoints report refusals as plain failures.
pub(crate) fn classify(
    response: &ProcessorResponse,
    allow_decline: bool,
) -> Result<Reply, GatewayError> {
    let reply = serde_json::from_value::<ProcessorReply>(response.body.clone()).ok();
    let failed = || GatewayError::Processor {
        status: response.status,
        body: response.body.clone(),
    };

    match reply {
        Some(reply) if response.is_success() && reply.success => Ok(Reply::Approved(reply)),
        Some(reply) if allow_decline && (response.status == 402 || response.is_success()) => {
            Ok(Reply::Declined(decline_reason(reply.decline_reason)))
        }
        None if allow_decline && response.status == 402 => {
            Ok(Reply::Declined(DEFAULT_DECLINE_REASON.to_string()))
        }
        None if response.is_success() => Err(GatewayError::MalformedResponse {
            reason: "reply is not a processor result object".to_string(),
            body: response.body.clone(),
        }),
        _ => Err(failed()),
    }
}

/// Vault path of a token, carried as a single percent-encoded segment
pub(crate) fn token_path(token: &RemoteToken) -> Result<String, GatewayError> {
    if matches!(token.as_str(), "." | "..") {
        return Err(GatewayError::InvalidRequest(format!(
            "token is not a valid path segment: {token}"
        )));
    }
    Ok(format!("/tokens/{}", urlencoding::encode(token.as_str())))
}

/// Vault replies must be approved outright
pub(crate) fn expect_approved(
    response: &ProcessorResponse,
) -> Result<ProcessorReply, GatewayError> {
    match classify(response, false)? {
        Reply::Approved(reply) => Ok(reply),
        Reply::Declined(_) => Err(GatewayError::Processor {
            status: response.status,
            body: response.body.clone(),
        }),
    }
}

fn decline_reason(reason: Option<String>) -> String {
    reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| DEFAULT_DECLINE_REASON.to_string())
}
