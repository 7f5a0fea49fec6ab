use async_trait::async_trait;
use thiserror::Error;

use crate::{
    account::{Account, AccountId, AccountStatus, NewAccount, OwnerId},
    money::Money,
    transaction::{Transaction, TransactionId},
};

pub mod in_memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("Account {0} already exists")]
    AccountExists(AccountId),
    #[error("Transaction {0} already exists")]
    TransactionExists(TransactionId),
    #[error("Could not serialize access due to a concurrent update")]
    SerializationConflict,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of accounts and the transaction log.
///
/// Reads outside a unit of work see committed data only. Every balance
/// mutation goes through [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork;

    /// Starts a serializable unit of work.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    /// Inserts an active account with a zero balance.
    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Accounts of one owner, active ones first, then by creation time.
    async fn list_accounts(
        &self,
        owner: OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>, StoreError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;
}

/// One serializable transaction against the store.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] rolls it back and
/// releases its row locks, which is what makes a cancelled operation leave no
/// trace.
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// Reads the account and holds an exclusive lock on its row until the unit
    /// ends. Waits while another unit holds the lock.
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    async fn set_balance(&mut self, id: AccountId, balance: Money) -> Result<(), StoreError>;

    async fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<(), StoreError>;

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Fails with [`StoreError::TransactionExists`] when the id is taken.
    async fn insert_transaction(&mut self, record: &Transaction) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
