//! Account registry
//!
//! A concurrent map from account ID to shared account. The registry only
//! hands out `Arc<Account>`; balances are still guarded by each account's own
//! lock, never by the map.
//!
//! # Process-wide instance
//!
//! [`Ledger::global`] returns one registry per process. It is created the
//! first time it is asked for, exactly once, however many threads race on
//! that first call.

use super::balance::ensure_non_negative;
use crate::types::{Account, AccountId, AccountSnapshot, LedgerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<Ledger>> = OnceCell::new();

/// Thread-safe registry of accounts
#[derive(Debug, Default)]
pub struct Ledger {
    /// Shared accounts by ID
    ///
    /// DashMap shards its locks, so lookups of different accounts never
    /// contend with each other.
    accounts: DashMap<AccountId, Arc<Account>>,

    /// Lowest ID not yet handed out by `open`
    next_id: AtomicU32,
}

impl Ledger {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use
    pub fn global() -> Arc<Ledger> {
        Arc::clone(GLOBAL.get_or_init(|| {
            tracing::debug!("initializing global ledger");
            Arc::new(Ledger::new())
        }))
    }

    /// Open an account under a freshly allocated ID
    ///
    /// # Arguments
    ///
    /// * `name` - Display name; not required to be unique
    /// * `balance` - Opening balance
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount` if `balance < 0`.
    pub fn open(
        &self,
        name: impl Into<String>,
        balance: Decimal,
    ) -> Result<Arc<Account>, LedgerError> {
        ensure_non_negative(balance, "open")?;
        let name = name.into();

        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            // Skip IDs already claimed by an explicit insert.
            if let Entry::Vacant(slot) = self.accounts.entry(id) {
                let account = Arc::new(Account::new(id, name, balance));
                slot.insert(Arc::clone(&account));
                tracing::debug!(account = id, name = account.name(), %balance, "account opened");
                return Ok(account);
            }
        }
    }

    /// Register an account built elsewhere
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccount` if the ID is already registered.
    pub fn insert(&self, account: Account) -> Result<Arc<Account>, LedgerError> {
        let id = account.id();
        match self.accounts.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::duplicate_account(id)),
            Entry::Vacant(slot) => {
                let account = Arc::new(account);
                slot.insert(Arc::clone(&account));
                self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
                Ok(account)
            }
        }
    }

    /// Look up an account
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for unknown IDs.
    pub fn get(&self, id: AccountId) -> Result<Arc<Account>, LedgerError> {
        self.accounts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Number of registered accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account is registered
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Snapshot of every account, sorted by ID
    ///
    /// Each balance is read under its own lock, one account at a time. While
    /// transfers are running the snapshot is not a consistent cut across
    /// accounts.
    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        let mut snapshots: Vec<AccountSnapshot> = self
            .accounts
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Sum of all balances, with the same consistency caveat as `snapshots`
    pub fn total_balance(&self) -> Decimal {
        self.accounts
            .iter()
            .map(|entry| entry.value().balance())
            .sum()
    }
}
