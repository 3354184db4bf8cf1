//! Defines the account model and the database queries for account balances.

use std::fmt::Display;

use rusqlite::{
    Connection, OptionalExtension, Row,
    types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, money::Money};

/// The opaque, unique identifier of an account.
///
/// Identifiers are totally ordered by their string value. The ledger relies on
/// this order when it needs exclusive access to more than one account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Generate a new random account ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl ToSql for AccountId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for AccountId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(Self)
    }
}

/// A wallet account and the money it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The balance, never negative.
    pub balance: Money,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id TEXT PRIMARY KEY,
            balance INTEGER NOT NULL CHECK (balance >= 0)
        )",
        (),
    )?;

    Ok(())
}

pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let balance = row.get(1)?;

    Ok(Account { id, balance })
}

/// Insert a new account with the given `balance`.
///
/// # Errors
/// Returns [Error::Sql] if the ID is already taken, the balance is negative or
/// there is some other SQL error.
pub fn insert_account(
    id: &AccountId,
    balance: Money,
    connection: &Connection,
) -> Result<Account, Error> {
    let account = connection
        .prepare("INSERT INTO account (id, balance) VALUES (?1, ?2) RETURNING id, balance")?
        .query_row((id, balance), map_row_to_account)?;

    Ok(account)
}

/// Get the account with `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such account, or [Error::Sql] if
/// there is some other SQL error.
pub fn get_account(id: &AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("SELECT id, balance FROM account WHERE id = :id")?
        .query_row(&[(":id", id)], map_row_to_account)
        .optional()?
        .ok_or_else(|| Error::NotFound(id.clone()))
}

/// Overwrite the balance of the account with `id`.
///
/// Callers must hold exclusive access to the account and run this inside the
/// same transaction they read the previous balance in.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such account, or [Error::Sql] if
/// the balance is negative or there is some other SQL error.
pub fn set_balance(id: &AccountId, balance: Money, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET balance = ?1 WHERE id = ?2",
        (balance, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound(id.clone()));
    }

    Ok(())
}

/// Get the total balance across all accounts.
///
/// # Errors
/// Returns [Error] if:
/// - Database connection fails
/// - SQL query preparation or execution fails
pub fn get_total_account_balance(connection: &Connection) -> Result<Money, Error> {
    let total = connection
        .prepare("SELECT COALESCE(SUM(balance), 0) FROM account")?
        .query_row([], |row| row.get(0))?;

    Ok(total)
}
