//! Defines the transfer record and the append-only transfer log.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, account::AccountId, money::Money};

/// Alias for the integer type used for transfer IDs.
///
/// IDs are assigned by the database and strictly increase in commit order.
pub type TransferId = i64;

/// A committed movement of money from one account to another.
///
/// Records are never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// The ID of the transfer.
    pub id: TransferId,
    /// When the transfer was committed, in UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The account the money was taken from.
    pub from: AccountId,
    /// The account the money was given to.
    pub to: AccountId,
    /// How much money was moved.
    pub amount: Money,
}

pub fn create_transfer_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS transfer (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            from_account TEXT NOT NULL REFERENCES account(id),
            to_account TEXT NOT NULL REFERENCES account(id),
            amount INTEGER NOT NULL CHECK (amount > 0)
        );
        CREATE INDEX IF NOT EXISTS idx_transfer_from_account ON transfer(from_account);
        CREATE INDEX IF NOT EXISTS idx_transfer_to_account ON transfer(to_account);",
    )?;

    Ok(())
}

fn map_transfer_row(row: &Row) -> Result<TransferRecord, rusqlite::Error> {
    Ok(TransferRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        from: row.get(2)?,
        to: row.get(3)?,
        amount: row.get(4)?,
    })
}

/// Append a transfer to the log.
///
/// This must run in the same transaction as the balance updates it documents.
///
/// # Errors
/// Returns [Error::Sql] if either account does not exist, `amount` is not
/// positive or there is some other SQL error.
pub fn insert_transfer(
    timestamp: OffsetDateTime,
    from: &AccountId,
    to: &AccountId,
    amount: Money,
    connection: &Connection,
) -> Result<TransferRecord, Error> {
    let record = connection
        .prepare(
            "INSERT INTO transfer (timestamp, from_account, to_account, amount)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, timestamp, from_account, to_account, amount",
        )?
        .query_row((timestamp, from, to, amount), map_transfer_row)?;

    Ok(record)
}

/// Get every transfer sent or received by `account`, oldest first.
///
/// # Errors
/// Returns [Error::Sql] if there is an SQL error.
pub fn get_transfers_for_account(
    account: &AccountId,
    connection: &Connection,
) -> Result<Vec<TransferRecord>, Error> {
    connection
        .prepare(
            "SELECT id, timestamp, from_account, to_account, amount
             FROM transfer
             WHERE from_account = :account OR to_account = :account
             ORDER BY id ASC",
        )?
        .query_map(&[(":account", account)], map_transfer_row)?
        .map(|maybe_record| maybe_record.map_err(|error| error.into()))
        .collect()
}
