//! Exclusive access to individual accounts.
//!
//! SQLite only locks the whole database for writing. [AccountLocks] provides
//! the per-account exclusive locks a transfer holds for the duration of its
//! database transaction.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{Error, account::AccountId};

/// The set of accounts currently held by in-flight operations.
#[derive(Debug, Default)]
pub struct AccountLocks {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive access to every account in `accounts`.
    ///
    /// Accounts are acquired one at a time in ascending [AccountId] order, no
    /// matter the order they are given in, so that two callers asking for the
    /// same pair of accounts can never wait on each other in a cycle.
    /// Duplicate IDs are only locked once.
    ///
    /// The locks are released when the returned guard is dropped.
    ///
    /// # Errors
    /// Returns [Error::Timeout] if every account could not be acquired within
    /// `timeout`. Accounts acquired before the deadline are released.
    pub fn acquire(
        &self,
        accounts: &[&AccountId],
        timeout: Duration,
    ) -> Result<AccountGuard<'_>, Error> {
        let mut ordered: Vec<AccountId> = accounts.iter().map(|&id| id.clone()).collect();
        ordered.sort();
        ordered.dedup();

        // A timeout too long to represent as an `Instant` never expires.
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = AccountGuard {
            locks: self,
            accounts: Vec::with_capacity(ordered.len()),
        };
        let mut held = self.held.lock();

        for account in ordered {
            while held.contains(&account) {
                let Some(deadline) = deadline else {
                    self.released.wait(&mut held);
                    continue;
                };

                if Instant::now() >= deadline {
                    tracing::warn!("timed out waiting for exclusive access to account {account}");
                    drop(held);
                    return Err(Error::Timeout);
                }

                self.released.wait_until(&mut held, deadline);
            }

            tracing::debug!("acquired exclusive access to account {account}");
            held.insert(account.clone());
            guard.accounts.push(account);
        }

        Ok(guard)
    }
}

/// Exclusive access to a set of accounts, released on drop.
#[derive(Debug)]
pub struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    accounts: Vec<AccountId>,
}

#[cfg(test)]
impl AccountGuard<'_> {
    /// The accounts held by this guard, in the order they were acquired.
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        if self.accounts.is_empty() {
            return;
        }

        let mut held = self.locks.held.lock();
        for account in &self.accounts {
            held.remove(account);
        }
        drop(held);

        self.locks.released.notify_all();
    }
}
