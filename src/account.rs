use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reference to the user owning an account. Owners live outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown account status `{0}`")]
pub struct UnknownAccountStatus(pub String);

impl FromStr for AccountStatus {
    type Err = UnknownAccountStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            other => Err(UnknownAccountStatus(other.to_string())),
        }
    }
}

/// Input for opening an account. The balance always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub id: AccountId,
    pub owner: OwnerId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingAction {
    Credit,
    Debit,
}

/// Single balance movement requested against one account.
#[derive(Debug, Clone, Copy)]
pub struct Posting {
    pub action: PostingAction,
    pub amount: Money,
}

impl Posting {
    pub fn credit(amount: Money) -> Self {
        Self {
            action: PostingAction::Credit,
            amount,
        }
    }

    pub fn debit(amount: Money) -> Self {
        Self {
            action: PostingAction::Debit,
            amount,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AccountEventKind {
    Credited,
    Debited,
    Closed,
}

#[derive(Debug)]
pub struct AccountEvent {
    amount: Money,
    kind: AccountEventKind,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account {account} is inactive, no further operations are allowed")]
    Inactive { account: AccountId },
    #[error("Insufficient balance in account {account}")]
    InsufficientBalance { account: AccountId },
    #[error("Account {account} cannot be closed while it holds {balance}")]
    BalanceNotZero { account: AccountId, balance: Money },
    #[error("Balance of account {account} would overflow")]
    BalanceOverflow { account: AccountId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: OwnerId,
    pub name: String,
    pub balance: Money,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn apply(&mut self, event: &AccountEvent) {
        match event.kind {
            AccountEventKind::Credited => {
                self.balance = self.balance + event.amount;
            }
            AccountEventKind::Debited => {
                self.balance = self.balance - event.amount;
            }
            AccountEventKind::Closed => {
                self.status = AccountStatus::Inactive;
            }
        }
    }

    /// Checks a posting against the current state. Nothing changes until the
    /// returned event is applied.
    pub fn handle_posting(&self, posting: Posting) -> Result<AccountEvent, AccountError> {
        if !self.is_active() {
            return Err(AccountError::Inactive { account: self.id });
        }

        match posting.action {
            PostingAction::Credit => {
                if self.balance.checked_add(posting.amount).is_none() {
                    return Err(AccountError::BalanceOverflow { account: self.id });
                }
                Ok(AccountEvent {
                    amount: posting.amount,
                    kind: AccountEventKind::Credited,
                })
            }
            PostingAction::Debit => {
                if self.balance >= posting.amount {
                    Ok(AccountEvent {
                        amount: posting.amount,
                        kind: AccountEventKind::Debited,
                    })
                } else {
                    Err(AccountError::InsufficientBalance { account: self.id })
                }
            }
        }
    }

    pub fn handle_close(&self) -> Result<AccountEvent, AccountError> {
        if !self.balance.is_zero() {
            return Err(AccountError::BalanceNotZero {
                account: self.id,
                balance: self.balance,
            });
        }
        Ok(AccountEvent {
            amount: Money::ZERO,
            kind: AccountEventKind::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn account(balance: &str) -> Account {
        let now = Utc::now();
        Account {
            id: AccountId::new(),
            owner: OwnerId::from_uuid(Uuid::now_v7()),
            name: "checking".to_string(),
            balance: money(balance),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_events() {
        let mut acc = account("0");
        acc.apply(&AccountEvent {
            amount: money("10"),
            kind: AccountEventKind::Credited,
        });
        assert_eq!(acc.balance, money("10"));
        acc.apply(&AccountEvent {
            amount: money("3"),
            kind: AccountEventKind::Debited,
        });
        assert_eq!(acc.balance, money("7"));
        // event is the source of truth, there's no more validation happening
        acc.apply(&AccountEvent {
            amount: Money::ZERO,
            kind: AccountEventKind::Closed,
        });
        assert_eq!(acc.status, AccountStatus::Inactive);
        assert_eq!(acc.balance, money("7"));
    }

    #[test]
    fn handle_posting() {
        let mut acc = account("0");

        let credit = acc.handle_posting(Posting::credit(money("13"))).unwrap();
        assert_eq!(credit.amount, money("13"));
        assert_eq!(credit.kind, AccountEventKind::Credited);

        let debit = Posting::debit(money("5"));
        let err = acc.handle_posting(debit).unwrap_err();
        assert!(matches!(err, AccountError::InsufficientBalance { account } if account == acc.id));

        acc.apply(&credit);
        let evt = acc.handle_posting(debit).unwrap();
        assert_eq!(evt.kind, AccountEventKind::Debited);
        acc.apply(&evt);
        assert_eq!(acc.balance, money("8"));

        // the whole balance may be withdrawn
        let evt = acc.handle_posting(Posting::debit(money("8"))).unwrap();
        acc.apply(&evt);
        assert!(acc.balance.is_zero());
    }

    #[test]
    fn inactive_account_rejects_postings() {
        let mut acc = account("0");
        acc.status = AccountStatus::Inactive;
        let err = acc.handle_posting(Posting::credit(money("1"))).unwrap_err();
        assert!(matches!(err, AccountError::Inactive { .. }));
        let err = acc.handle_posting(Posting::debit(money("1"))).unwrap_err();
        assert!(matches!(err, AccountError::Inactive { .. }));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let acc = account("1");
        let huge = Money::new(rust_decimal::Decimal::MAX);
        let err = acc.handle_posting(Posting::credit(huge)).unwrap_err();
        assert!(matches!(err, AccountError::BalanceOverflow { .. }));
    }

    #[test]
    fn close_requires_zero_balance() {
        let mut acc = account("0.01");
        let err = acc.handle_close().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Account {} cannot be closed while it holds 0.01", acc.id)
        );

        acc.balance = Money::ZERO;
        let evt = acc.handle_close().unwrap();
        acc.apply(&evt);
        assert!(!acc.is_active());
    }

    #[test]
    fn status_round_trips_through_its_column_form() {
        for status in [AccountStatus::Active, AccountStatus::Inactive] {
            assert_eq!(status.as_str().parse::<AccountStatus>().unwrap(), status);
        }
        assert!("frozen".parse::<AccountStatus>().is_err());
    }
}
