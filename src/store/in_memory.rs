//! Process-local store with the locking behaviour of a serializable
//! relational database.
//!
//! Row locks are exclusive and held until the unit of work ends. Conflicts are
//! first-updater-wins: locking a row that another unit committed after this
//! unit's snapshot was taken fails with
//! [`StoreError::SerializationConflict`]. Accounts created after the snapshot
//! are not found.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::trace;

use crate::{
    account::{Account, AccountId, AccountStatus, NewAccount, OwnerId},
    money::Money,
    transaction::{Transaction, TransactionId},
};

use super::{LedgerStore, StoreError, UnitOfWork};

type UnitId = u64;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Signalled whenever a unit ends and its locks or reserved ids are freed.
    released: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, AccountRow>,
    transactions: HashMap<TransactionId, Transaction>,
    /// Ids inserted by units that have not finished yet.
    reserved_ids: HashMap<TransactionId, UnitId>,
    commit_seq: u64,
    next_unit: UnitId,
}

struct AccountRow {
    account: Account,
    /// `commit_seq` of the last commit that wrote this row.
    version: u64,
    created_seq: u64,
    locked_by: Option<UnitId>,
}

pub struct InMemoryUnit {
    shared: Arc<Shared>,
    id: UnitId,
    snapshot: u64,
    locked: HashSet<AccountId>,
    writes: HashMap<AccountId, Account>,
    inserts: Vec<Transaction>,
    finished: bool,
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<InMemoryUnit, StoreError> {
        let (id, snapshot) = {
            let mut state = self.shared.state();
            state.next_unit += 1;
            (state.next_unit, state.commit_seq)
        };
        trace!(unit = id, snapshot, "unit of work started");
        Ok(InMemoryUnit {
            shared: Arc::clone(&self.shared),
            id,
            snapshot,
            locked: HashSet::new(),
            writes: HashMap::new(),
            inserts: Vec::new(),
            finished: false,
        })
    }

    async fn insert_account(&self, new: &NewAccount) -> Result<Account, StoreError> {
        let mut state = self.shared.state();
        if state.accounts.contains_key(&new.id) {
            return Err(StoreError::AccountExists(new.id));
        }
        state.commit_seq += 1;
        let now = Utc::now();
        let account = Account {
            id: new.id,
            owner: new.owner,
            name: new.name.clone(),
            balance: Money::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let row = AccountRow {
            account: account.clone(),
            version: state.commit_seq,
            created_seq: state.commit_seq,
            locked_by: None,
        };
        state.accounts.insert(new.id, row);
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.shared
            .state()
            .accounts
            .get(&id)
            .map(|row| row.account.clone())
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn list_accounts(
        &self,
        owner: OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>, StoreError> {
        let state = self.shared.state();
        let mut rows: Vec<&AccountRow> = state
            .accounts
            .values()
            .filter(|row| row.account.owner == owner)
            .collect();
        rows.sort_by_key(|row| (row.account.status, row.created_seq));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.account.clone())
            .collect())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.shared.state().transactions.get(&id).cloned())
    }
}

impl InMemoryUnit {
    async fn lock_row(&mut self, id: AccountId) -> Result<Account, StoreError> {
        if let Some(account) = self.writes.get(&id) {
            return Ok(account.clone());
        }
        let shared = Arc::clone(&self.shared);
        loop {
            let released = shared.released.notified();
            {
                let mut state = shared.state();
                let row = state
                    .accounts
                    .get_mut(&id)
                    // rows created after the snapshot are not visible to it
                    .filter(|row| row.created_seq <= self.snapshot)
                    .ok_or(StoreError::AccountNotFound(id))?;
                match row.locked_by {
                    Some(holder) if holder == self.id => return Ok(row.account.clone()),
                    Some(holder) => {
                        trace!(unit = self.id, holder, account = %id, "waiting for row lock");
                    }
                    None if row.version > self.snapshot => {
                        return Err(StoreError::SerializationConflict);
                    }
                    None => {
                        row.locked_by = Some(self.id);
                        self.locked.insert(id);
                        return Ok(row.account.clone());
                    }
                }
            }
            released.await;
        }
    }

    fn abandon(&mut self) {
        {
            let mut state = self.shared.state();
            release_locks(&mut state, self.locked.drain());
            for record in self.inserts.drain(..) {
                state.reserved_ids.remove(&record.id);
            }
        }
        self.writes.clear();
        self.finished = true;
        self.shared.released.notify_waiters();
    }
}

fn release_locks(state: &mut State, locked: impl Iterator<Item = AccountId>) {
    for id in locked {
        if let Some(row) = state.accounts.get_mut(&id) {
            row.locked_by = None;
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.lock_row(id).await
    }

    async fn set_balance(&mut self, id: AccountId, balance: Money) -> Result<(), StoreError> {
        let mut account = self.lock_row(id).await?;
        account.balance = balance;
        account.updated_at = Utc::now();
        self.writes.insert(id, account);
        Ok(())
    }

    async fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<(), StoreError> {
        let mut account = self.lock_row(id).await?;
        account.status = status;
        account.updated_at = Utc::now();
        self.writes.insert(id, account);
        Ok(())
    }

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        if let Some(record) = self.inserts.iter().find(|record| record.id == id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.shared.state().transactions.get(&id).cloned())
    }

    async fn insert_transaction(&mut self, record: &Transaction) -> Result<(), StoreError> {
        let shared = Arc::clone(&self.shared);
        loop {
            let released = shared.released.notified();
            {
                let mut state = shared.state();
                if state.transactions.contains_key(&record.id)
                    || self.inserts.iter().any(|pending| pending.id == record.id)
                {
                    return Err(StoreError::TransactionExists(record.id));
                }
                match state.reserved_ids.get(&record.id) {
                    Some(holder) if *holder != self.id => {
                        trace!(unit = self.id, holder, tx_id = %record.id, "waiting for transaction id");
                    }
                    _ => {
                        state.reserved_ids.insert(record.id, self.id);
                        self.inserts.push(record.clone());
                        return Ok(());
                    }
                }
            }
            released.await;
        }
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        {
            let mut state = self.shared.state();
            state.commit_seq += 1;
            let version = state.commit_seq;
            for (id, account) in self.writes.drain() {
                if let Some(row) = state.accounts.get_mut(&id) {
                    row.account = account;
                    row.version = version;
                }
            }
            for record in self.inserts.drain(..) {
                state.reserved_ids.remove(&record.id);
                state.transactions.insert(record.id, record);
            }
            release_locks(&mut state, self.locked.drain());
            trace!(unit = self.id, version, "unit of work committed");
        }
        self.finished = true;
        self.shared.released.notify_waiters();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.abandon();
        Ok(())
    }
}

impl Drop for InMemoryUnit {
    fn drop(&mut self) {
        if !self.finished {
            trace!(unit = self.id, "unit of work dropped, rolling back");
            self.abandon();
        }
    }
}
