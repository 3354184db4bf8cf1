//! Walletd keeps per-account balances and moves money between accounts.
//!
//! The [Ledger] is the only writer of account balances and the transfer log.
//! Each transfer debits the sender, credits the recipient and appends a
//! [TransferRecord] in a single SQLite transaction, while holding exclusive
//! access to both accounts.
//!
//! ```no_run
//! use walletd::{Ledger, LedgerConfig};
//!
//! # fn main() -> Result<(), walletd::Error> {
//! let ledger = Ledger::new(LedgerConfig::new("wallet.db"))?;
//! let alice = ledger.create_account()?;
//! let bob = ledger.create_account()?;
//!
//! ledger.transfer(&alice.id, &bob.id, "12.50".parse()?)?;
//!
//! assert_eq!(ledger.get_account(&alice.id)?.balance.to_string(), "87.50");
//! assert_eq!(ledger.get_history(&bob.id)?.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod account;
mod config;
mod db;
mod ledger;
mod lock;
mod logging;
mod money;
mod transfer;

pub use account::{Account, AccountId};
pub use config::{DEFAULT_INITIAL_BALANCE, DEFAULT_TIMEOUT, LedgerConfig, MAX_BUSY_TIMEOUT};
pub use ledger::Ledger;
pub use logging::init_logging;
pub use money::{MINOR_UNIT_SCALE, Money};
pub use transfer::{TransferId, TransferRecord};

/// The errors that may occur in the ledger.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The referenced account does not exist.
    ///
    /// Retrying with the same arguments will not succeed.
    #[error("account {0} does not exist")]
    NotFound(AccountId),

    /// The sender's balance, read while holding exclusive access to the
    /// account, was less than the requested amount.
    #[error("account {account} has {balance}, which is not enough to transfer {requested}")]
    InsufficientFunds {
        /// The account that could not cover the transfer.
        account: AccountId,
        /// The balance of the account when the transfer was attempted.
        balance: Money,
        /// The amount that was requested.
        requested: Money,
    },

    /// The amount was not positive, could not be parsed, or had more precision
    /// than a minor unit.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Exclusive access to an account or the database could not be acquired in
    /// time. The operation had no effect and may be retried.
    #[error("timed out waiting for exclusive access")]
    Timeout,

    /// A [LedgerConfig] value is outside the range the store supports.
    #[error("invalid ledger config: {0}")]
    InvalidConfig(String),

    /// An unhandled/unexpected SQL error.
    ///
    /// The operation had no effect. The error string should only be logged for
    /// debugging, callers should treat this as the store being unavailable.
    #[error("an unexpected SQL error occurred: {0}")]
    Sql(rusqlite::Error),
}

impl Error {
    /// Whether the same request may succeed if retried.
    ///
    /// Timeouts and store failures are retryable. A constraint violation is
    /// not: the database rejected the write itself and will do so again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Sql(rusqlite::Error::SqliteFailure(error, _)) => {
                error.code != rusqlite::ErrorCode::ConstraintViolation
            }
            Error::Sql(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                    extended_code: _,
                },
                _,
            ) => {
                tracing::warn!("timed out waiting for the database lock: {}", value);
                Error::Timeout
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::Sql(error)
            }
        }
    }
}
