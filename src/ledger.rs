//! The ledger engine: account creation, balance queries and atomic transfers.

use rusqlite::{Connection, TransactionBehavior};
use time::OffsetDateTime;

use crate::{
    Error,
    account::{self, Account, AccountId},
    config::LedgerConfig,
    db,
    lock::AccountLocks,
    money::Money,
    transfer::{self, TransferRecord},
};

/// Moves money between accounts stored in a SQLite database.
///
/// A `Ledger` can be shared between threads. Each operation opens its own
/// connection, so no balance is ever cached between operations.
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    locks: AccountLocks,
}

impl Ledger {
    /// Create a ledger backed by the database at [LedgerConfig::db_path].
    ///
    /// The database schema is created if it does not exist.
    ///
    /// # Errors
    /// Returns [Error::InvalidConfig] if the busy timeout is longer than
    /// SQLite supports, otherwise an error if the database cannot be opened
    /// or initialized.
    pub fn new(config: LedgerConfig) -> Result<Self, Error> {
        let connection = db::open_connection(&config)?;
        db::initialize(&connection)?;
        tracing::debug!("opened ledger database {}", config.db_path.display());

        Ok(Self {
            config,
            locks: AccountLocks::new(),
        })
    }

    /// The config the ledger was created with.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn connect(&self) -> Result<Connection, Error> {
        db::open_connection(&self.config)
    }

    /// Create an account with a new random ID and the configured initial balance.
    ///
    /// # Errors
    /// Returns [Error::Sql] or [Error::Timeout] if the store is unavailable.
    pub fn create_account(&self) -> Result<Account, Error> {
        let connection = self.connect()?;
        let account = account::insert_account(
            &AccountId::generate(),
            self.config.initial_balance,
            &connection,
        )?;

        tracing::info!(
            "created account {} with balance {}",
            account.id,
            account.balance
        );

        Ok(account)
    }

    /// Get the latest committed state of the account with `id`.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no such account.
    pub fn get_account(&self, id: &AccountId) -> Result<Account, Error> {
        let connection = self.connect()?;

        account::get_account(id, &connection)
    }

    /// Move `amount` from the account `from` to the account `to`.
    ///
    /// The debit, the credit and the transfer record are committed together or
    /// not at all. Both accounts are held exclusively until the commit
    /// finishes, so concurrent transfers touching the same account run one
    /// after the other.
    ///
    /// A transfer from an account to itself is accepted as long as the account
    /// could afford it. The balance is unchanged but the transfer is recorded.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidAmount] if `amount` is not positive or the credit would
    ///   overflow the recipient's balance,
    /// - [Error::NotFound] if either account does not exist,
    /// - [Error::InsufficientFunds] if the sender's balance is less than `amount`,
    /// - [Error::Timeout] if exclusive access could not be acquired in time,
    /// - or [Error::Sql] if there is some other SQL error.
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Money,
    ) -> Result<TransferRecord, Error> {
        let span = tracing::info_span!("transfer", %from, %to, %amount);
        let _entered = span.enter();

        if !amount.is_positive() {
            return Err(Error::InvalidAmount(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }

        let _guard = self.locks.acquire(&[from, to], self.config.lock_timeout)?;

        let mut connection = self.connect()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sender = account::get_account(from, &transaction)?;
        let recipient = account::get_account(to, &transaction)?;

        if sender.balance < amount {
            tracing::warn!(
                "rejected transfer, account {from} only has {}",
                sender.balance
            );
            return Err(Error::InsufficientFunds {
                account: sender.id,
                balance: sender.balance,
                requested: amount,
            });
        }

        if from != to {
            let debited = sender.balance.checked_sub(amount).ok_or_else(|| {
                Error::InvalidAmount(format!("debiting {amount} overflows account {from}"))
            })?;
            let credited = recipient.balance.checked_add(amount).ok_or_else(|| {
                Error::InvalidAmount(format!("crediting {amount} overflows account {to}"))
            })?;

            account::set_balance(from, debited, &transaction)?;
            account::set_balance(to, credited, &transaction)?;
        }

        let record =
            transfer::insert_transfer(OffsetDateTime::now_utc(), from, to, amount, &transaction)?;

        transaction.commit()?;
        tracing::info!("committed transfer {}", record.id);

        Ok(record)
    }

    /// Get every transfer sent or received by the account with `id`, oldest first.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no such account.
    pub fn get_history(&self, id: &AccountId) -> Result<Vec<TransferRecord>, Error> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;

        account::get_account(id, &transaction)?;
        let history = transfer::get_transfers_for_account(id, &transaction)?;

        transaction.commit()?;

        Ok(history)
    }

    /// Get the sum of the balances of every account.
    ///
    /// Transfers never change this total, only creating accounts does.
    pub fn total_balance(&self) -> Result<Money, Error> {
        let connection = self.connect()?;

        account::get_total_account_balance(&connection)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::{
        Error,
        account::AccountId,
        config::{DEFAULT_INITIAL_BALANCE, LedgerConfig},
        money::Money,
    };

    use super::Ledger;

    fn get_test_ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(LedgerConfig::new(dir.path().join("ledger.db"))).unwrap();

        (dir, ledger)
    }

    fn money(amount: &str) -> Money {
        amount.parse().unwrap()
    }

    #[test]
    fn new_account_has_initial_balance() {
        let (_dir, ledger) = get_test_ledger();

        let account = ledger.create_account().unwrap();

        assert_eq!(account.balance, DEFAULT_INITIAL_BALANCE);
        assert_eq!(ledger.get_account(&account.id).unwrap(), account);
    }

    #[test]
    fn initial_balance_comes_from_config() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            initial_balance: money("12.34"),
            ..LedgerConfig::new(dir.path().join("ledger.db"))
        };
        let ledger = Ledger::new(config).unwrap();

        let account = ledger.create_account().unwrap();

        assert_eq!(account.balance, money("12.34"));
    }

    #[test]
    fn account_ids_are_unique() {
        let (_dir, ledger) = get_test_ledger();

        let first = ledger.create_account().unwrap();
        let second = ledger.create_account().unwrap();

        assert_ne!(first.id, second.id);
    }

    #[test]
    fn get_unknown_account_is_not_found() {
        let (_dir, ledger) = get_test_ledger();
        let id = AccountId::from("nonexistent");

        assert_eq!(ledger.get_account(&id), Err(Error::NotFound(id)));
    }

    #[test]
    fn transfer_moves_money_and_records_it() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();

        let record = ledger.transfer(&x.id, &y.id, money("50")).unwrap();

        assert_eq!(record.from, x.id);
        assert_eq!(record.to, y.id);
        assert_eq!(record.amount, money("50"));
        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("50"));
        assert_eq!(ledger.get_account(&y.id).unwrap().balance, money("150"));
        assert_eq!(ledger.get_history(&x.id).unwrap(), vec![record.clone()]);
        assert_eq!(ledger.get_history(&y.id).unwrap(), vec![record]);
    }

    #[test]
    fn whole_balance_can_be_transferred() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();

        ledger.transfer(&x.id, &y.id, money("100")).unwrap();

        assert_eq!(ledger.get_account(&x.id).unwrap().balance, Money::ZERO);
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();

        let result = ledger.transfer(&x.id, &y.id, money("100.01"));

        assert_eq!(
            result,
            Err(Error::InsufficientFunds {
                account: x.id.clone(),
                balance: money("100"),
                requested: money("100.01"),
            })
        );
        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("100"));
        assert_eq!(ledger.get_account(&y.id).unwrap().balance, money("100"));
        assert!(ledger.get_history(&x.id).unwrap().is_empty());
        assert!(ledger.get_history(&y.id).unwrap().is_empty());
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();

        for amount in [Money::ZERO, money("-5")] {
            let result = ledger.transfer(&x.id, &y.id, amount);

            assert!(
                matches!(result, Err(Error::InvalidAmount(_))),
                "amount {amount} gave {result:?}"
            );
        }
        assert!(ledger.get_history(&x.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let nobody = AccountId::from("nonexistent");

        let result = ledger.transfer(&x.id, &nobody, money("10"));

        assert_eq!(result, Err(Error::NotFound(nobody)));
        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("100"));
    }

    #[test]
    fn unknown_sender_is_not_found() {
        let (_dir, ledger) = get_test_ledger();
        let y = ledger.create_account().unwrap();
        let nobody = AccountId::from("nonexistent");

        let result = ledger.transfer(&nobody, &y.id, money("10"));

        assert_eq!(result, Err(Error::NotFound(nobody)));
        assert_eq!(ledger.get_account(&y.id).unwrap().balance, money("100"));
    }

    #[test]
    fn self_transfer_is_recorded_without_changing_balance() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();

        let record = ledger.transfer(&x.id, &x.id, money("30")).unwrap();

        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("100"));
        assert_eq!(ledger.get_history(&x.id).unwrap(), vec![record]);
    }

    #[test]
    fn self_transfer_still_needs_funds() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();

        let result = ledger.transfer(&x.id, &x.id, money("100.01"));

        assert!(
            matches!(result, Err(Error::InsufficientFunds { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn history_of_unknown_account_is_not_found() {
        let (_dir, ledger) = get_test_ledger();
        let id = AccountId::from("nonexistent");

        assert_eq!(ledger.get_history(&id), Err(Error::NotFound(id)));
    }

    #[test]
    fn history_is_chronological() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();

        let first = ledger.transfer(&x.id, &y.id, money("1")).unwrap();
        let second = ledger.transfer(&y.id, &x.id, money("2")).unwrap();
        let third = ledger.transfer(&x.id, &y.id, money("3")).unwrap();

        let history = ledger.get_history(&x.id).unwrap();

        assert_eq!(history, vec![first, second, third]);
        assert!(history.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[test]
    fn transfer_times_out_while_account_is_held() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            lock_timeout: Duration::from_millis(50),
            ..LedgerConfig::new(dir.path().join("ledger.db"))
        };
        let ledger = Ledger::new(config).unwrap();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();
        let _held = ledger.locks.acquire(&[&y.id], Duration::ZERO).unwrap();

        let result = ledger.transfer(&x.id, &y.id, money("10"));

        assert_eq!(result, Err(Error::Timeout));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("100"));
        assert!(ledger.get_history(&x.id).unwrap().is_empty());
    }

    #[test]
    fn total_balance_only_changes_when_accounts_are_created() {
        let (_dir, ledger) = get_test_ledger();
        let x = ledger.create_account().unwrap();
        let y = ledger.create_account().unwrap();
        let before = ledger.total_balance().unwrap();

        ledger.transfer(&x.id, &y.id, money("42.42")).unwrap();
        ledger.transfer(&y.id, &x.id, money("0.01")).unwrap();
        let _ = ledger.transfer(&x.id, &y.id, money("1000"));

        assert_eq!(before, money("200"));
        assert_eq!(ledger.total_balance().unwrap(), before);
    }

    #[test]
    fn ledger_reopens_existing_database() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(dir.path().join("ledger.db"));
        let (x, y) = {
            let ledger = Ledger::new(config.clone()).unwrap();
            let x = ledger.create_account().unwrap();
            let y = ledger.create_account().unwrap();
            ledger.transfer(&x.id, &y.id, money("25")).unwrap();
            (x, y)
        };

        let ledger = Ledger::new(config).unwrap();

        assert_eq!(ledger.get_account(&x.id).unwrap().balance, money("75"));
        assert_eq!(ledger.get_account(&y.id).unwrap().balance, money("125"));
        assert_eq!(ledger.get_history(&y.id).unwrap().len(), 1);
    }

    #[test]
    fn busy_timeout_longer_than_sqlite_supports_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            busy_timeout: Duration::from_millis(u64::MAX),
            ..LedgerConfig::new(dir.path().join("ledger.db"))
        };

        let error = Ledger::new(config).err();

        assert!(
            matches!(error, Some(Error::InvalidConfig(_))),
            "got {error:?}"
        );
    }

    #[test]
    fn lock_timeout_has_no_upper_bound() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            lock_timeout: Duration::from_millis(u64::MAX),
            ..LedgerConfig::new(dir.path().join("ledger.db"))
        };

        assert!(Ledger::new(config).is_ok());
    }
}
