use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    account::AccountId,
    money::Money,
    transaction::{Transaction, TransactionId, TransactionKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCommand {
    Deposit {
        to: AccountId,
        amount: Money,
    },
    Withdrawal {
        from: AccountId,
        amount: Money,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Money,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Amount must be greater than zero for {kind}")]
    InvalidAmount { kind: TransactionKind },
    #[error("Source and destination account must differ")]
    SameAccount,
}

impl LedgerCommand {
    pub fn kind(&self) -> TransactionKind {
        match self {
            LedgerCommand::Deposit { .. } => TransactionKind::Deposit,
            LedgerCommand::Withdrawal { .. } => TransactionKind::Withdrawal,
            LedgerCommand::Transfer { .. } => TransactionKind::Transfer,
        }
    }

    pub fn amount(&self) -> Money {
        match *self {
            LedgerCommand::Deposit { amount, .. }
            | LedgerCommand::Withdrawal { amount, .. }
            | LedgerCommand::Transfer { amount, .. } => amount,
        }
    }

    pub fn source(&self) -> Option<AccountId> {
        match *self {
            LedgerCommand::Deposit { .. } => None,
            LedgerCommand::Withdrawal { from, .. } | LedgerCommand::Transfer { from, .. } => {
                Some(from)
            }
        }
    }

    pub fn destination(&self) -> Option<AccountId> {
        match *self {
            LedgerCommand::Withdrawal { .. } => None,
            LedgerCommand::Deposit { to, .. } | LedgerCommand::Transfer { to, .. } => Some(to),
        }
    }

    /// Rejects what can be rejected without reading any account, so a bad
    /// request never takes a row lock.
    pub fn validate(self) -> Result<Self, CommandError> {
        if !self.amount().is_positive() {
            return Err(CommandError::InvalidAmount { kind: self.kind() });
        }
        if let LedgerCommand::Transfer { from, to, .. } = self
            && from == to
        {
            return Err(CommandError::SameAccount);
        }
        Ok(self)
    }

    pub fn record(&self, id: TransactionId, issued_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            kind: self.kind(),
            from_account: self.source(),
            to_account: self.destination(),
            amount: self.amount(),
            issued_at,
        }
    }
}
