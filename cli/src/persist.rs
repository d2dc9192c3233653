use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const HISTORY_FILE_NAME: &str = "history.txt";
pub(crate) const DATABASE_FILE_NAME: &str = "token-gateway.db";

pub(crate) struct CliPersistence {
    pub(crate) data_dir: PathBuf,
}

impl CliPersistence {
    pub(crate) fn history_file(&self) -> String {
        let history_file = self.data_dir.join(HISTORY_FILE_NAME);
        history_file.to_string_lossy().to_string()
    }

    pub(crate) fn database_file(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }
}

/// Card on file for a billing client, as the host records it
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StoredPayMethod {
    pub client_id: String,
    /// Remote token issued by the processor
    pub gateway_id: String,
    pub card_type: String,
    pub last4: String,
    pub created_at: i64,
}

/// Outcome of a capture or refund, as the host's gateway log records it
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TransactionRecord {
    pub id: String,
    pub invoice_id: String,
    pub kind: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub timestamp: i64,
}

/// Host-side storage. The gateway module itself never persists anything.
pub(crate) trait TokenStore {
    /// Save or replace the token held for a client
    fn save_pay_method(&self, pay_method: &StoredPayMethod) -> Result<()>;

    /// Get the token held for a client
    fn get_pay_method(&self, client_id: &str) -> Result<Option<StoredPayMethod>>;

    /// Forget the token held for a client
    fn delete_pay_method(&self, client_id: &str) -> Result<bool>;

    /// Record a capture or refund outcome
    fn save_transaction(&self, transaction: &TransactionRecord) -> Result<()>;

    /// Get a transaction by ID
    fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>>;

    /// List transactions, newest first
    fn list_transactions(&self, offset: u32, limit: u32) -> Result<Vec<TransactionRecord>>;
}

/// SQLite implementation of the TokenStore trait
pub(crate) struct SqliteTokenStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTokenStore {
    /// Opens (and creates if needed) the database at `db_path`
    pub(crate) fn new(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        let store = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        store.init()?;
        Ok(store)
    }

    /// Creates a new in-memory store for testing
    #[cfg(test)]
    pub(crate) fn new_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        let store = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        store.init()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("Failed to lock connection"))
    }

    fn init(&self) -> Result<()> {
        let connection = self.connection()?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS pay_methods (
          client_id TEXT PRIMARY KEY,
          gateway_id TEXT NOT NULL,
          card_type TEXT NOT NULL,
          last4 TEXT NOT NULL,
          created_at INTEGER NOT NULL
      )",
            [],
        )?;

        connection.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
          id TEXT PRIMARY KEY,
          invoice_id TEXT NOT NULL,
          kind TEXT NOT NULL,
          amount TEXT NOT NULL,
          currency TEXT NOT NULL,
          status TEXT NOT NULL,
          timestamp INTEGER NOT NULL
      )",
            [],
        )?;

        Ok(())
    }
}

fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        kind: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        status: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

impl TokenStore for SqliteTokenStore {
    fn save_pay_method(&self, pay_method: &StoredPayMethod) -> Result<()> {
        self.connection()?.execute(
            "INSERT OR REPLACE INTO pay_methods (
                client_id, gateway_id, card_type, last4, created_at
            ) VALUES (?, ?, ?, ?, ?)",
            params![
                pay_method.client_id,
                pay_method.gateway_id,
                pay_method.card_type,
                pay_method.last4,
                pay_method.created_at,
            ],
        )?;

        Ok(())
    }

    fn get_pay_method(&self, client_id: &str) -> Result<Option<StoredPayMethod>> {
        let connection = self.connection()?;
        let pay_method = connection.query_row(
            "SELECT client_id, gateway_id, card_type, last4, created_at
             FROM pay_methods
             WHERE client_id = ?",
            params![client_id],
            |row| {
                Ok(StoredPayMethod {
                    client_id: row.get(0)?,
                    gateway_id: row.get(1)?,
                    card_type: row.get(2)?,
                    last4: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        );

        match pay_method {
            Ok(pay_method) => Ok(Some(pay_method)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_pay_method(&self, client_id: &str) -> Result<bool> {
        let deleted = self.connection()?.execute(
            "DELETE FROM pay_methods WHERE client_id = ?",
            params![client_id],
        )?;
        Ok(deleted > 0)
    }

    fn save_transaction(&self, transaction: &TransactionRecord) -> Result<()> {
        self.connection()?.execute(
            "INSERT OR REPLACE INTO transactions (
                id, invoice_id, kind, amount, currency, status, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                transaction.id,
                transaction.invoice_id,
                transaction.kind,
                transaction.amount,
                transaction.currency,
                transaction.status,
                transaction.timestamp,
            ],
        )?;

        Ok(())
    }

    fn get_transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let connection = self.connection()?;
        let transaction = connection.query_row(
            "SELECT id, invoice_id, kind, amount, currency, status, timestamp
             FROM transactions
             WHERE id = ?",
            params![id],
            transaction_from_row,
        );

        match transaction {
            Ok(transaction) => Ok(Some(transaction)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_transactions(&self, offset: u32, limit: u32) -> Result<Vec<TransactionRecord>> {
        let connection = self.connection()?;
        let mut stmt = connection.prepare(
            "SELECT id, invoice_id, kind, amount, currency, status, timestamp
             FROM transactions
             ORDER BY timestamp DESC
             LIMIT ? OFFSET ?",
        )?;

        let transactions = stmt
            .query_map(params![limit, offset], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(transactions)
    }
}
