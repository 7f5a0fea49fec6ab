use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    account::{Account, AccountId, NewAccount, OwnerId, Posting},
    command::LedgerCommand,
    lock_order::lock_order,
    money::Money,
    store::{LedgerStore, UnitOfWork},
    transaction::{Transaction, TransactionId},
};

use super::{LedgerError, TransactionProcessor};

/// Runs every ledger operation as one serializable unit of work on `S`.
///
/// A single attempt only; wrap it in
/// [`RetryCoordinator`](super::retry::RetryCoordinator) to retry transfers on
/// serialization conflicts.
pub struct LedgerProcessor<S> {
    store: S,
}

impl<S> LedgerProcessor<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn open_account(&self, new: NewAccount) -> Result<Account, LedgerError> {
        let account = self.store.insert_account(&new).await?;
        info!(account = %account.id, owner = %account.owner, "Account opened");
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        Ok(self.store.get_account(id).await?)
    }

    pub async fn list_accounts(
        &self,
        owner: OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.list_accounts(owner, limit, offset).await?)
    }

    /// Marks the account inactive. Only an empty account can be closed;
    /// closing an inactive account is a no-op.
    pub async fn close_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let mut unit = self.store.begin().await?;
        match close(&mut unit, id).await {
            Ok(account) => {
                unit.commit().await?;
                info!(account = %id, "Account closed");
                Ok(account)
            }
            Err(err) => {
                rollback(unit).await;
                Err(err)
            }
        }
    }

    async fn execute(&self, tx_id: TransactionId, command: LedgerCommand) -> Result<(), LedgerError> {
        let command = command.validate()?;

        let mut unit = self.store.begin().await?;
        match apply(&mut unit, tx_id, command).await {
            Ok(()) => {
                unit.commit().await?;
                info!(
                    tx_id = %tx_id,
                    kind = %command.kind(),
                    amount = %command.amount(),
                    "Transaction committed"
                );
                Ok(())
            }
            Err(err) => {
                debug!(tx_id = %tx_id, kind = %command.kind(), error = %err, "Transaction rolled back");
                rollback(unit).await;
                Err(err)
            }
        }
    }
}

async fn apply<U>(unit: &mut U, tx_id: TransactionId, command: LedgerCommand) -> Result<(), LedgerError>
where
    U: UnitOfWork,
{
    // The unique key on insert is what really guards the id; this only saves
    // taking locks for a request that is going to fail anyway.
    if unit.get_transaction(tx_id).await?.is_some() {
        return Err(LedgerError::DuplicateTransaction(tx_id));
    }

    match command {
        LedgerCommand::Deposit { to, amount } => {
            let account = unit.get_for_update(to).await?;
            post(unit, account, Posting::credit(amount)).await?;
        }
        LedgerCommand::Withdrawal { from, amount } => {
            let account = unit.get_for_update(from).await?;
            post(unit, account, Posting::debit(amount)).await?;
        }
        LedgerCommand::Transfer { from, to, amount } => {
            let (first, second) = lock_order(from, to);
            let first = unit.get_for_update(first).await?;
            let second = unit.get_for_update(second).await?;
            let (source, destination) = if first.id == from {
                (first, second)
            } else {
                (second, first)
            };
            post(unit, source, Posting::debit(amount)).await?;
            post(unit, destination, Posting::credit(amount)).await?;
        }
    }

    unit.insert_transaction(&command.record(tx_id, Utc::now()))
        .await?;
    Ok(())
}

async fn post<U>(unit: &mut U, mut account: Account, posting: Posting) -> Result<(), LedgerError>
where
    U: UnitOfWork,
{
    let event = account.handle_posting(posting)?;
    account.apply(&event);
    unit.set_balance(account.id, account.balance).await?;
    Ok(())
}

async fn close<U>(unit: &mut U, id: AccountId) -> Result<Account, LedgerError>
where
    U: UnitOfWork,
{
    let mut account = unit.get_for_update(id).await?;
    if !account.is_active() {
        return Ok(account);
    }
    let event = account.handle_close()?;
    account.apply(&event);
    unit.set_status(id, account.status).await?;
    Ok(account)
}

async fn rollback<U>(unit: U)
where
    U: UnitOfWork,
{
    if let Err(err) = unit.rollback().await {
        // the store discards the unit on its own once the session is gone
        warn!(error = %err, "Rollback failed");
    }
}

#[async_trait]
impl<S> TransactionProcessor for LedgerProcessor<S>
where
    S: LedgerStore,
{
    async fn deposit(
        &self,
        tx_id: TransactionId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        self.execute(tx_id, LedgerCommand::Deposit { to, amount })
            .await
    }

    async fn withdrawal(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        self.execute(tx_id, LedgerCommand::Withdrawal { from, amount })
            .await
    }

    async fn transfer(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        self.execute(tx_id, LedgerCommand::Transfer { from, to, amount })
            .await
    }

    async fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
        self.store
            .get_transaction(tx_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(tx_id))
    }
}
