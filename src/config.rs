//! Startup configuration for the ledger.

use std::{path::PathBuf, time::Duration};

use crate::money::Money;

/// The balance every new account starts with, `100.00`.
pub const DEFAULT_INITIAL_BALANCE: Money = Money::from_minor_units(100_00);

/// How long to wait for exclusive access to an account or the database before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The longest busy timeout SQLite accepts, `i32::MAX` milliseconds.
pub const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// The config that controls where the ledger is stored and how it behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// File path to the SQLite database. Created if it does not exist.
    pub db_path: PathBuf,
    /// The balance given to every newly created account.
    pub initial_balance: Money,
    /// The maximum time a transfer waits for exclusive access to its accounts.
    pub lock_timeout: Duration,
    /// The maximum time an operation waits for SQLite's write lock.
    ///
    /// Must not exceed [MAX_BUSY_TIMEOUT].
    pub busy_timeout: Duration,
}

impl LedgerConfig {
    /// Create a config for the database at `db_path` with default settings.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wallet.db"),
            initial_balance: DEFAULT_INITIAL_BALANCE,
            lock_timeout: DEFAULT_TIMEOUT,
            busy_timeout: DEFAULT_TIMEOUT,
        }
    }
}
