//! Codec between the host platform's flat parameter/result bags and the typed
//! gateway model.

use log::warn;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

use crate::error::GatewayError;
use crate::models::{
    CaptureRequest, CardDate, ConfigField, Contact, Credentials, CurrencyCode, PayMethod,
    PaymentSource, RefundRequest, RemoteToken, StoreRemoteAction, StoreRemoteRequest,
};
use crate::TokenGateway;

/// Client fields of a host parameter bag
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientDetails {
    #[serde(deserialize_with = "lenient_string")]
    pub firstname: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub lastname: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub address1: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub address2: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub postcode: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub country: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub phonenumber: Option<String>,
}

impl From<&ClientDetails> for Contact {
    fn from(details: &ClientDetails) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Contact {
            first_name: text(&details.firstname),
            last_name: text(&details.lastname),
            email: text(&details.email),
            address1: text(&details.address1),
            address2: text(&details.address2),
            city: text(&details.city),
            state: text(&details.state),
            postcode: text(&details.postcode),
            country: text(&details.country),
            phone: text(&details.phonenumber),
        }
    }
}

/// Flat parameter bag the host passes into every callback.
///
/// Empty strings are treated as absent and numbers are accepted wherever the
/// host may send either a number or a string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostParams {
    #[serde(rename = "apiUsername", deserialize_with = "lenient_string")]
    pub api_username: Option<String>,
    #[serde(rename = "apiPassword", deserialize_with = "lenient_string")]
    pub api_password: Option<String>,
    #[serde(rename = "testMode", deserialize_with = "yes_no")]
    pub test_mode: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub action: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub gatewayid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cardtype: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cardnum: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cardexp: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cardstart: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cardissuenum: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub cccvv: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub invoiceid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub transid: Option<String>,
    pub clientdetails: ClientDetails,
}

impl HostParams {
    pub fn from_value(bag: Value) -> Result<Self, GatewayError> {
        serde_json::from_value(bag)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed parameter bag: {e}")))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.api_username.clone().unwrap_or_default(),
            self.api_password.clone().unwrap_or_default(),
            self.test_mode,
        )
    }

    pub fn remote_token(&self) -> Option<RemoteToken> {
        self.gatewayid
            .as_deref()
            .and_then(|token| RemoteToken::parse(token).ok())
    }

    fn cvv(&self) -> Option<SecretString> {
        self.cccvv.clone().map(SecretString::from)
    }

    /// Card data from the bag, validated
    pub fn pay_method(&self) -> Result<PayMethod, GatewayError> {
        let pay_method = PayMethod {
            card_type: self.cardtype.clone().unwrap_or_default(),
            card_number: SecretString::from(required(&self.cardnum, "cardnum")?.to_string()),
            expiry: required(&self.cardexp, "cardexp")?.parse()?,
            start: self.cardstart.as_deref().map(CardDate::from_str).transpose()?,
            issue_number: self.cardissuenum.clone(),
            cvv: self.cvv(),
            contact: Contact::from(&self.clientdetails),
        };
        pay_method.validate()?;
        Ok(pay_method)
    }

    pub fn store_remote_request(&self) -> Result<StoreRemoteRequest, GatewayError> {
        let token = || {
            self.remote_token().ok_or_else(|| {
                GatewayError::InvalidRequest("missing required field: gatewayid".to_string())
            })
        };
        let action = match required(&self.action, "action")? {
            "create" => StoreRemoteAction::Create {
                pay_method: self.pay_method()?,
            },
            "update" => StoreRemoteAction::Update {
                token: token()?,
                pay_method: self.pay_method()?,
            },
            "delete" => StoreRemoteAction::Delete { token: token()? },
            other => {
                return Err(GatewayError::InvalidRequest(format!(
                    "unknown store action: {other}"
                )))
            }
        };

        Ok(StoreRemoteRequest {
            credentials: self.credentials(),
            action,
        })
    }

    /// Builds a capture. A token in the bag wins over card data.
    pub fn capture_request(&self) -> Result<CaptureRequest, GatewayError> {
        let source = match (self.remote_token(), self.cardnum.is_some()) {
            (Some(token), _) => PaymentSource::Token(token),
            (None, true) => PaymentSource::PayMethod(self.pay_method()?),
            (None, false) => {
                return Err(GatewayError::InvalidRequest(
                    "capture needs either a gatewayid or card data".to_string(),
                ))
            }
        };

        Ok(CaptureRequest {
            credentials: self.credentials(),
            source,
            cvv: self.cvv(),
            amount: amount(&self.amount)?,
            currency: required(&self.currency, "currency")?.parse()?,
            invoice_id: required(&self.invoiceid, "invoiceid")?.to_string(),
            description: self.description.clone(),
        })
    }

    pub fn refund_request(&self) -> Result<RefundRequest, GatewayError> {
        Ok(RefundRequest {
            credentials: self.credentials(),
            transaction_id: required(&self.transid, "transid")?.to_string(),
            amount: amount(&self.amount)?,
            currency: CurrencyCode::from_str(required(&self.currency, "currency")?)?,
            token: self.remote_token(),
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, GatewayError> {
    value
        .as_deref()
        .ok_or_else(|| GatewayError::InvalidRequest(format!("missing required field: {name}")))
}

fn amount(value: &Option<String>) -> Result<Decimal, GatewayError> {
    let raw = required(value, "amount")?;
    Decimal::from_str(raw.trim())
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid amount: {raw}")))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        Some(other) => {
            return Err(de::Error::custom(format!(
                "expected a scalar value, found {other}"
            )))
        }
    })
}

fn yes_no<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "on" | "yes" | "1" | "true"
        ),
        _ => false,
    })
}

fn error_bag(err: &GatewayError) -> Value {
    json!({"status": "error", "rawdata": err.raw_data()})
}

fn to_bag<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| error_bag(&GatewayError::from(e)))
}

/// Configuration schema keyed by field name, as the host expects it
pub fn config_bag(fields: &[ConfigField]) -> Value {
    let bag: Map<String, Value> = fields
        .iter()
        .map(|field| (field.name.clone(), to_bag(field)))
        .collect();
    Value::Object(bag)
}

/// Runs a host callback by name against a flat parameter bag and returns the
/// flat result bag.
///
/// Bags that fail validation come back as an `error` result; the admin status
/// message yields `null` when there is nothing to show.
pub async fn invoke<G: TokenGateway + ?Sized>(gateway: &G, operation: &str, bag: Value) -> Value {
    let operation = operation.trim().to_ascii_lowercase();
    match operation.as_str() {
        "metadata" => to_bag(&gateway.metadata()),
        "config" => config_bag(&gateway.config_fields()),
        "adminstatusmsg" => HostParams::from_value(bag)
            .ok()
            .and_then(|params| gateway.describe_token(params.remote_token().as_ref()))
            .map(|message| to_bag(&message))
            .unwrap_or(Value::Null),
        "storeremote" => match HostParams::from_value(bag).and_then(|p| p.store_remote_request()) {
            Ok(request) => to_bag(&gateway.store_remote(request).await),
            Err(e) => rejected(&operation, e),
        },
        "capture" => match HostParams::from_value(bag).and_then(|p| p.capture_request()) {
            Ok(request) => to_bag(&gateway.capture(request).await),
            Err(e) => rejected(&operation, e),
        },
        "refund" => match HostParams::from_value(bag).and_then(|p| p.refund_request()) {
            Ok(request) => to_bag(&gateway.refund(request).await),
            Err(e) => rejected(&operation, e),
        },
        other => rejected(
            other,
            GatewayError::InvalidRequest(format!("unknown operation: {other}")),
        ),
    }
}

fn rejected(operation: &str, err: GatewayError) -> Value {
    warn!("Rejected {operation} call: {err}");
    error_bag(&err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway_builder::GatewayBuilder;
    use crate::models::Config;
    use crate::transport::mock::MockProcessor;
    use secrecy::ExposeSecret;
    use std::sync::Arc;

    fn card_bag() -> Value {
        json!({
            "apiUsername": "user",
            "apiPassword": "secret",
            "testMode": "on",
            "cardtype": "Visa",
            "cardnum": "4111111111111111",
            "cardexp": "0427",
            "cardstart": "",
            "cardissuenum": "",
            "cccvv": "123",
            "clientdetails": {
                "firstname": "Jane",
                "lastname": "Doe",
                "email": "jane@example.com",
                "address1": "1 Main St",
                "address2": "",
                "city": "Springfield",
                "state": "IL",
                "postcode": 62701,
                "country": "US",
                "phonenumber": "+1.5555550100"
            }
        })
    }

    fn with(mut bag: Value, extra: Value) -> Value {
        if let (Some(bag), Some(extra)) = (bag.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                bag.insert(key.clone(), value.clone());
            }
        }
        bag
    }

    fn test_gateway() -> crate::GatewayClient {
        let config = Config {
            retry_backoff_ms: 1,
            ..Config::default_config()
        };
        GatewayBuilder::new(config)
            .transport(Arc::new(MockProcessor::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_parses_host_bag() {
        let params = HostParams::from_value(with(card_bag(), json!({"action": "create"}))).unwrap();
        let credentials = params.credentials();
        assert_eq!("user", credentials.api_username);
        assert_eq!("secret", credentials.api_password.expose_secret());
        assert!(credentials.test_mode);
        assert_eq!(None, params.cardstart);

        let request = params.store_remote_request().unwrap();
        match request.action {
            StoreRemoteAction::Create { pay_method } => {
                assert_eq!("62701", pay_method.contact.postcode);
                assert_eq!("Jane Doe", pay_method.contact.full_name());
                assert_eq!(None, pay_method.start);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_test_mode_flag_variants() {
        for (flag, expected) in [
            (json!("on"), true),
            (json!(true), true),
            (json!(1), true),
            (json!(""), false),
            (json!(null), false),
            (json!("off"), false),
        ] {
            let params = HostParams::from_value(json!({"testMode": flag})).unwrap();
            assert_eq!(expected, params.test_mode, "flag {flag}");
        }
    }

    #[test]
    fn test_capture_prefers_token_and_requires_a_source() {
        let bag = with(
            card_bag(),
            json!({
                "gatewayid": "abc1111111111",
                "invoiceid": 42,
                "amount": 10.5,
                "currency": "usd",
            }),
        );
        let request = HostParams::from_value(bag).unwrap().capture_request().unwrap();
        assert!(matches!(
            request.source,
            PaymentSource::Token(ref token) if token.as_str() == "abc1111111111"
        ));
        assert_eq!("42", request.invoice_id);
        assert_eq!(Decimal::new(105, 1), request.amount);
        assert_eq!("USD", request.currency.as_str());

        let bag = json!({"invoiceid": "42", "amount": "10.00", "currency": "USD"});
        let err = HostParams::from_value(bag).unwrap().capture_request().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn test_update_and_delete_need_a_token() {
        let bag = with(card_bag(), json!({"action": "delete"}));
        assert!(HostParams::from_value(bag).unwrap().store_remote_request().is_err());

        let bag = with(card_bag(), json!({"action": "archive", "gatewayid": "abc"}));
        assert!(HostParams::from_value(bag).unwrap().store_remote_request().is_err());
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let gateway = test_gateway();

        let create_bag = with(card_bag(), json!({"action": "create"}));
        let created = invoke(&gateway, "storeremote", create_bag).await;
        assert_eq!("success", created["status"]);
        let token = created["gatewayid"].as_str().unwrap().to_string();

        let captured = invoke(
            &gateway,
            "capture",
            with(
                card_bag(),
                json!({
                    "gatewayid": token,
                    "cccvv": "",
                    "invoiceid": 7,
                    "amount": "25.00",
                    "currency": "USD",
                }),
            ),
        )
        .await;
        assert_eq!("success", captured["status"]);
        assert_eq!("1.23", captured["fee"]);
        let transid = captured["transid"].as_str().unwrap().to_string();

        let refunded = invoke(
            &gateway,
            "refund",
            json!({"transid": transid, "amount": "25.00", "currency": "USD", "gatewayid": token}),
        )
        .await;
        assert_eq!("success", refunded["status"]);

        let status = invoke(&gateway, "adminstatusmsg", json!({"gatewayid": token})).await;
        assert_eq!("info", status["type"]);
        assert!(status["msg"].as_str().unwrap().ends_with(&token));

        let delete_bag = json!({"action": "delete", "gatewayid": token});
        let deleted = invoke(&gateway, "storeremote", delete_bag).await;
        assert_eq!(json!({"status": "success", "rawdata": {"success": true}}), deleted);
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_bags() {
        let gateway = test_gateway();

        let result = invoke(&gateway, "capture", json!({"amount": "10.00"})).await;
        assert_eq!("error", result["status"]);
        assert_eq!("invalid_request", result["rawdata"]["error"]);

        let result = invoke(&gateway, "void", json!({})).await;
        assert_eq!("error", result["status"]);

        assert_eq!(Value::Null, invoke(&gateway, "adminstatusmsg", json!({"gatewayid": ""})).await);
    }

    #[tokio::test]
    async fn test_invoke_metadata_and_config() {
        let gateway = test_gateway();

        let metadata = invoke(&gateway, "metadata", Value::Null).await;
        assert_eq!(
            json!({"DisplayName": "Sample Tokenisation Gateway Module", "APIVersion": "1.1"}),
            metadata
        );

        let config = invoke(&gateway, "config", Value::Null).await;
        assert_eq!("System", config["FriendlyName"]["Type"]);
        assert_eq!("password", config["apiPassword"]["Type"]);
        assert_eq!("yesno", config["testMode"]["Type"]);
        assert_eq!("API Username", config["apiUsername"]["FriendlyName"]);
    }
}
