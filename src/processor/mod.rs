use async_trait::async_trait;
use thiserror::Error;

use crate::{
    account::{AccountError, AccountId},
    command::CommandError,
    money::Money,
    store::StoreError,
    transaction::{Transaction, TransactionId},
};

pub mod ledger_processor;
pub mod retry;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("Amount must be greater than zero")]
    InvalidAmount,
    #[error("Source and destination account must differ")]
    SameAccount,
    #[error("Insufficient balance in account {0}")]
    InsufficientBalance(AccountId),
    #[error("Account {0} is inactive")]
    AccountInactive(AccountId),
    #[error("Account {0} still holds a balance")]
    BalanceNotZero(AccountId),
    #[error("Transaction {0} was already recorded")]
    DuplicateTransaction(TransactionId),
    #[error("Account {0} already exists")]
    DuplicateAccount(AccountId),
    #[error("Serialization conflict, the operation was rolled back")]
    SerializationConflict,
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Stable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::SameAccount => "SAME_ACCOUNT",
            LedgerError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            LedgerError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            LedgerError::BalanceNotZero(_) => "BALANCE_NOT_ZERO",
            LedgerError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            LedgerError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            LedgerError::SerializationConflict => "SERIALIZATION_CONFLICT",
            LedgerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => 404,
            LedgerError::InvalidAmount | LedgerError::SameAccount => 400,
            LedgerError::InsufficientBalance(_) | LedgerError::AccountInactive(_) => 422,
            LedgerError::BalanceNotZero(_)
            | LedgerError::DuplicateTransaction(_)
            | LedgerError::DuplicateAccount(_)
            | LedgerError::SerializationConflict => 409,
            LedgerError::StoreUnavailable(_) => 503,
        }
    }

    /// Business rejection of a well-formed request, as opposed to an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            LedgerError::SerializationConflict | LedgerError::StoreUnavailable(_)
        )
    }
}

impl From<CommandError> for LedgerError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::InvalidAmount { .. } => LedgerError::InvalidAmount,
            CommandError::SameAccount => LedgerError::SameAccount,
        }
    }
}

impl From<AccountError> for LedgerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Inactive { account } => LedgerError::AccountInactive(account),
            AccountError::InsufficientBalance { account } => {
                LedgerError::InsufficientBalance(account)
            }
            AccountError::BalanceNotZero { account, .. } => LedgerError::BalanceNotZero(account),
            AccountError::BalanceOverflow { .. } => LedgerError::InvalidAmount,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::AccountExists(id) => LedgerError::DuplicateAccount(id),
            StoreError::TransactionExists(id) => LedgerError::DuplicateTransaction(id),
            StoreError::SerializationConflict => LedgerError::SerializationConflict,
            StoreError::Unavailable(reason) => LedgerError::StoreUnavailable(reason),
        }
    }
}

/// The balance-mutating surface of the ledger.
///
/// Each call either commits in full or leaves no trace. Ids are chosen by the
/// caller; a second call with an id already recorded fails with
/// [`LedgerError::DuplicateTransaction`] and changes nothing.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    async fn deposit(
        &self,
        tx_id: TransactionId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError>;

    async fn withdrawal(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError>;

    async fn transfer(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError>;

    async fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError>;
}
