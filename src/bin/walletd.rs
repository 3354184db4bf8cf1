use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use serde::Serialize;

use walletd::{AccountId, Error, Ledger, LedgerConfig, MAX_BUSY_TIMEOUT, Money, init_logging};

/// Create wallet accounts, move money between them and inspect their history.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger's SQLite database.
    #[arg(long, env = "WALLETD_DB_PATH", default_value = "wallet.db")]
    db_path: PathBuf,

    /// The balance every new account starts with.
    #[arg(long, env = "WALLETD_INITIAL_BALANCE", default_value = "100.00")]
    initial_balance: Money,

    /// How long a transfer may wait for exclusive access to its accounts.
    #[arg(long, env = "WALLETD_LOCK_TIMEOUT_MS", default_value_t = 5000)]
    lock_timeout_ms: u64,

    /// How long an operation may wait for the database write lock.
    #[arg(
        long,
        env = "WALLETD_BUSY_TIMEOUT_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(..=MAX_BUSY_TIMEOUT.as_millis() as u64)
    )]
    busy_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account with the initial balance.
    CreateAccount,
    /// Show the balance of an account.
    Balance {
        /// The account ID.
        id: String,
    },
    /// Move money from one account to another.
    Transfer {
        /// The account to take the money from.
        from: String,
        /// The account to give the money to.
        to: String,
        /// The amount to move, e.g. 12.50.
        amount: Money,
    },
    /// List the transfers sent or received by an account, oldest first.
    History {
        /// The account ID.
        id: String,
    },
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            db_path: self.db_path.clone(),
            initial_balance: self.initial_balance,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// The ways a command can fail.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Ledger(#[from] Error),

    #[error("could not write output as JSON: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(exit_status(&error))
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let ledger = Ledger::new(args.ledger_config())?;

    match &args.command {
        Command::CreateAccount => print_json(&ledger.create_account()?),
        Command::Balance { id } => print_json(&ledger.get_account(&AccountId::from(id.as_str()))?),
        Command::Transfer { from, to, amount } => print_json(&ledger.transfer(
            &AccountId::from(from.as_str()),
            &AccountId::from(to.as_str()),
            *amount,
        )?),
        Command::History { id } => print_json(&ledger.get_history(&AccountId::from(id.as_str()))?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");

    Ok(())
}

/// Map each kind of error to its own exit code so scripts can tell them apart.
fn exit_status(error: &CliError) -> u8 {
    match error {
        CliError::Output(_) => 1,
        CliError::Ledger(Error::NotFound(_)) => 2,
        CliError::Ledger(Error::InsufficientFunds { .. }) => 3,
        CliError::Ledger(Error::InvalidAmount(_)) => 4,
        CliError::Ledger(Error::Timeout | Error::Sql(_)) => 5,
        CliError::Ledger(Error::InvalidConfig(_)) => 6,
    }
}
