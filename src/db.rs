/*! Opening connections to the ledger database and creating its schema. */

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    account::create_account_table,
    config::{LedgerConfig, MAX_BUSY_TIMEOUT},
    transfer::create_transfer_table,
};

/// Open a connection to the database described by `config`.
///
/// Every connection enforces foreign keys and waits up to
/// [LedgerConfig::busy_timeout] for another connection's write lock.
///
/// # Errors
/// Returns [Error::InvalidConfig] if the busy timeout is longer than SQLite
/// supports, or [Error::Sql] if the database file cannot be opened.
pub fn open_connection(config: &LedgerConfig) -> Result<Connection, Error> {
    if config.busy_timeout > MAX_BUSY_TIMEOUT {
        return Err(Error::InvalidConfig(format!(
            "busy timeout of {} ms is longer than the maximum of {} ms",
            config.busy_timeout.as_millis(),
            MAX_BUSY_TIMEOUT.as_millis()
        )));
    }

    let connection = Connection::open(&config.db_path)?;
    connection.busy_timeout(config.busy_timeout)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    Ok(connection)
}

/// Create the tables for the domain models if they do not exist yet.
///
/// File-backed databases are switched to write-ahead logging so that balance
/// and history reads do not block transfers.
///
/// # Errors
/// Returns an error if the schema cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let journal_mode: String =
        connection.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    tracing::debug!("database journal mode is {journal_mode}");

    let transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&transaction)?;
    create_transfer_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
