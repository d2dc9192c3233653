use crate::persist::{StoredPayMethod, TokenStore, TransactionRecord};
use anyhow::anyhow;
use clap::arg;
use rust_decimal::Decimal;
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::{Completer, Helper, Hinter, Validator};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::borrow::Cow;
use std::borrow::Cow::Owned;
use token_gateway::models::{
    CaptureRequest, CaptureResult, CardDate, Contact, Credentials, CurrencyCode, OperationResult,
    PayMethod, PaymentSource, RefundRequest, RefundResult, RemoteToken, StoreRemoteAction,
    StoreRemoteRequest, StoreRemoteResult,
};
use token_gateway::{host, GatewayClient, TokenGateway};

/// Card details entered at the prompt
#[derive(Clone, clap::Args)]
pub(crate) struct CardArgs {
    /// Card brand, e.g. Visa
    #[arg(long, default_value = "Visa")]
    card_type: String,

    /// Full card number
    #[arg(short = 'n', long)]
    card_number: String,

    /// Expiry date as mmyy
    #[arg(short = 'e', long)]
    expiry: CardDate,

    /// Card security code
    #[arg(long)]
    cvv: Option<String>,

    /// Cardholder first name
    #[arg(long, default_value = "")]
    first_name: String,

    /// Cardholder last name
    #[arg(long, default_value = "")]
    last_name: String,

    /// Billing postcode
    #[arg(long, default_value = "")]
    postcode: String,

    /// Billing country code
    #[arg(long, default_value = "")]
    country: String,
}

impl CardArgs {
    fn into_pay_method(self) -> PayMethod {
        PayMethod {
            card_type: self.card_type,
            card_number: SecretString::from(self.card_number),
            expiry: self.expiry,
            start: None,
            issue_number: None,
            cvv: self.cvv.map(SecretString::from),
            contact: Contact {
                first_name: self.first_name,
                last_name: self.last_name,
                postcode: self.postcode,
                country: self.country,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, clap::clap_derive::Parser)]
pub(crate) enum Commands {
    /// Show the module metadata
    Metadata {},

    /// Show the configuration fields the host renders
    Config {},

    /// Store a new card for a client and keep the returned token
    AddCard {
        /// Billing client the card belongs to
        #[arg(short, long)]
        client_id: String,

        #[command(flatten)]
        card: CardArgs,
    },

    /// Replace the card stored for a client
    UpdateCard {
        /// Billing client the card belongs to
        #[arg(short, long)]
        client_id: String,

        #[command(flatten)]
        card: CardArgs,
    },

    /// Remove the card stored for a client
    DeleteCard {
        /// Billing client the card belongs to
        #[arg(short, long)]
        client_id: String,
    },

    /// Charge an invoice against the client's stored token
    Capture {
        /// Billing client to charge
        #[arg(short, long)]
        client_id: String,

        /// Invoice being paid
        #[arg(short, long)]
        invoice_id: String,

        /// Amount to charge
        #[arg(short, long)]
        amount: Decimal,

        /// Three-letter currency code
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,

        /// Card security code, when the end user supplied one
        #[arg(long)]
        cvv: Option<String>,

        /// Invoice description sent to the processor
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Refund a prior transaction
    Refund {
        /// Transaction to reverse
        #[arg(short, long)]
        transaction_id: String,

        /// Amount to refund
        #[arg(short, long)]
        amount: Decimal,

        /// Three-letter currency code
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,

        /// Client whose token is sent along with the refund
        #[arg(short, long)]
        client_id: Option<String>,
    },

    /// Show the admin status message for a client
    Status {
        /// Billing client to describe
        #[arg(short, long)]
        client_id: String,
    },

    /// Call a module entry point with a raw host parameter bag
    Invoke {
        /// Entry point name, e.g. capture or storeremote
        operation: String,

        /// Parameter bag as JSON
        #[arg(default_value = "{}")]
        params: String,
    },

    /// List recorded transactions
    ListTransactions {
        /// Number of transactions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,

        /// Number of transactions to skip
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// Exit the interactive shell (interactive mode only)
    #[command(hide = true)]
    Exit {},
}

#[derive(Helper, Completer, Hinter, Validator)]
pub(crate) struct CliHelper {
    #[rustyline(Hinter)]
    pub(crate) hinter: HistoryHinter,
}

impl Highlighter for CliHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }
}

#[derive(Serialize)]
pub(crate) struct CommandResult<T: Serialize> {
    pub success: bool,
    pub message: T,
}

macro_rules! command_result {
    ($expr:expr) => {{
        to_string_pretty(&CommandResult {
            success: true,
            message: $expr,
        })?
    }};
}

/// Everything a command needs: the gateway, the host-side store and the
/// gateway settings the host would pass in
pub(crate) struct CliContext<S: TokenStore> {
    pub(crate) gateway: GatewayClient,
    pub(crate) store: S,
    pub(crate) credentials: Credentials,
}

impl<S: TokenStore> CliContext<S> {
    fn stored_token(&self, client_id: &str) -> Result<Option<RemoteToken>, anyhow::Error> {
        match self.store.get_pay_method(client_id)? {
            Some(pay_method) => Ok(Some(RemoteToken::parse(pay_method.gateway_id)?)),
            None => Ok(None),
        }
    }

    fn require_token(&self, client_id: &str) -> Result<RemoteToken, anyhow::Error> {
        self.stored_token(client_id)?
            .ok_or_else(|| anyhow!("No card stored for client {client_id}"))
    }

    fn record(
        &self,
        kind: &str,
        invoice_id: &str,
        transaction_id: Option<&str>,
        amount: Decimal,
        currency: &CurrencyCode,
        status: &str,
    ) -> Result<(), anyhow::Error> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let id = match transaction_id {
            Some(id) => id.to_string(),
            None => format!("{kind}-{invoice_id}-{timestamp}"),
        };
        self.store.save_transaction(&TransactionRecord {
            id,
            invoice_id: invoice_id.to_string(),
            kind: kind.to_string(),
            amount: amount.to_string(),
            currency: currency.to_string(),
            status: status.to_string(),
            timestamp,
        })
    }
}

pub(crate) async fn execute_command<S: TokenStore>(
    command: Commands,
    ctx: &CliContext<S>,
) -> Result<String, anyhow::Error> {
    let gateway = &ctx.gateway;
    Ok(match command {
        Commands::Metadata {} => command_result!(gateway.metadata()),
        Commands::Config {} => command_result!(host::config_bag(&gateway.config_fields())),
        Commands::AddCard { client_id, card } => {
            let card_type = card.card_type.clone();
            let pay_method = card.into_pay_method();
            let last4 = pay_method.last4();
            let result = gateway
                .store_remote(StoreRemoteRequest {
                    credentials: ctx.credentials.clone(),
                    action: StoreRemoteAction::Create { pay_method },
                })
                .await;
            if let StoreRemoteResult::Success {
                gateway_id: Some(token),
                ..
            } = &result
            {
                ctx.store.save_pay_method(&StoredPayMethod {
                    client_id,
                    gateway_id: token.to_string(),
                    card_type,
                    last4,
                    created_at: chrono::Utc::now().timestamp(),
                })?;
            }
            command_result!(result)
        }
        Commands::UpdateCard { client_id, card } => {
            let token = ctx.require_token(&client_id)?;
            let card_type = card.card_type.clone();
            let pay_method = card.into_pay_method();
            let last4 = pay_method.last4();
            let result = gateway
                .store_remote(StoreRemoteRequest {
                    credentials: ctx.credentials.clone(),
                    action: StoreRemoteAction::Update { token, pay_method },
                })
                .await;
            if let StoreRemoteResult::Success {
                gateway_id: Some(token),
                ..
            } = &result
            {
                ctx.store.save_pay_method(&StoredPayMethod {
                    client_id,
                    gateway_id: token.to_string(),
                    card_type,
                    last4,
                    created_at: chrono::Utc::now().timestamp(),
                })?;
            }
            command_result!(result)
        }
        Commands::DeleteCard { client_id } => {
            let token = ctx.require_token(&client_id)?;
            let result = gateway
                .store_remote(StoreRemoteRequest {
                    credentials: ctx.credentials.clone(),
                    action: StoreRemoteAction::Delete { token },
                })
                .await;
            if let StoreRemoteResult::Success { .. } = &result {
                ctx.store.delete_pay_method(&client_id)?;
            }
            command_result!(result)
        }
        Commands::Capture {
            client_id,
            invoice_id,
            amount,
            currency,
            cvv,
            description,
        } => {
            let token = ctx.require_token(&client_id)?;
            let result = gateway
                .capture(CaptureRequest {
                    credentials: ctx.credentials.clone(),
                    source: PaymentSource::Token(token),
                    cvv: cvv.map(SecretString::from),
                    amount,
                    currency: currency.clone(),
                    invoice_id: invoice_id.clone(),
                    description,
                })
                .await;
            match &result {
                CaptureResult::Success {
                    transaction_id,
                    gateway_id,
                    ..
                } => {
                    // The processor may rotate the token on a charge
                    if let (Some(new_token), Some(mut stored)) =
                        (gateway_id, ctx.store.get_pay_method(&client_id)?)
                    {
                        stored.gateway_id = new_token.to_string();
                        ctx.store.save_pay_method(&stored)?;
                    }
                    ctx.record(
                        "capture",
                        &invoice_id,
                        Some(transaction_id.as_str()),
                        amount,
                        &currency,
                        "success",
                    )?;
                }
                other => {
                    let status = other.status().to_string();
                    ctx.record("capture", &invoice_id, None, amount, &currency, &status)?;
                }
            }
            command_result!(result)
        }
        Commands::Refund {
            transaction_id,
            amount,
            currency,
            client_id,
        } => {
            let token = match client_id {
                Some(client_id) => ctx.stored_token(&client_id)?,
                None => None,
            };
            let invoice_id = match ctx.store.get_transaction(&transaction_id)? {
                Some(original) => original.invoice_id,
                None => String::new(),
            };
            let result = gateway
                .refund(RefundRequest {
                    credentials: ctx.credentials.clone(),
                    transaction_id: transaction_id.clone(),
                    amount,
                    currency: currency.clone(),
                    token,
                })
                .await;
            let refund_id = match &result {
                RefundResult::Success { transaction_id, .. } => Some(transaction_id.as_str()),
                _ => None,
            };
            let status = result.status().to_string();
            ctx.record("refund", &invoice_id, refund_id, amount, &currency, &status)?;
            command_result!(result)
        }
        Commands::Status { client_id } => {
            let token = ctx.stored_token(&client_id)?;
            command_result!(gateway.describe_token(token.as_ref()))
        }
        Commands::Invoke { operation, params } => {
            let bag = serde_json::from_str(&params)?;
            command_result!(host::invoke(gateway, &operation, bag).await)
        }
        Commands::ListTransactions { limit, offset } => {
            let transactions = ctx.store.list_transactions(offset, limit)?;

            println!("Recent transactions:");
            println!(
                "{:<24} {:<8} {:<12} {:<12} {:<8} {:<9} Date",
                "ID", "Type", "Invoice", "Amount", "Currency", "Status"
            );
            println!("{}", "-".repeat(90));

            for transaction in transactions {
                let date = chrono::DateTime::from_timestamp_millis(transaction.timestamp)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());

                println!(
                    "{:<24} {:<8} {:<12} {:<12} {:<8} {:<9} {}",
                    transaction.id,
                    transaction.kind,
                    transaction.invoice_id,
                    transaction.amount,
                    transaction.currency,
                    transaction.status,
                    date
                );
            }
            "".to_string()
        }
        Commands::Exit {} => command_result!("Exiting"),
    })
}
