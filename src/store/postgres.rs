//! PostgreSQL adapter.
//!
//! Every unit of work is a `SERIALIZABLE` transaction, row locks are taken with
//! `SELECT ... FOR UPDATE`, and SQLSTATE codes are mapped onto [`StoreError`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    FromRow, Postgres,
    postgres::{PgPool, PgPoolOptions},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    account::{Account, AccountId, AccountStatus, NewAccount, OwnerId},
    config::DatabaseConfig,
    money::Money,
    transaction::{Transaction, TransactionId, TransactionKind},
};

use super::{LedgerStore, StoreError, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Creates the ledger tables when they are missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err
            && matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            )
        {
            return StoreError::SerializationConflict;
        }
        StoreError::Unavailable(err.to_string())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    balance: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Account {
            id: AccountId::from_uuid(row.id),
            owner: OwnerId::from_uuid(row.owner_id),
            name: row.name,
            balance: Money::new(row.balance),
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    from_account_id: Option<Uuid>,
    to_account_id: Option<Uuid>,
    amount: Decimal,
    issued_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<TransactionKind>()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            kind,
            from_account: row.from_account_id.map(AccountId::from_uuid),
            to_account: row.to_account_id.map(AccountId::from_uuid),
            amount: Money::new(row.amount),
            issued_at: row.issued_at,
        })
    }
}

pub struct PostgresUnit {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PostgresStore {
    type Unit = PostgresUnit;

    async fn begin(&self) -> Result<PostgresUnit, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresUnit { tx })
    }

    async fn insert_account(&self, new: &NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO account (id, owner_id, name, balance, status)
            VALUES ($1, $2, $3, 0, 'active')
            RETURNING id, owner_id, name, balance, status, created_at, updated_at
            "#,
        )
        .bind(*new.id.as_uuid())
        .bind(*new.owner.as_uuid())
        .bind(&new.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AccountExists(new.id)
            } else {
                err.into()
            }
        })?;
        row.try_into()
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, owner_id, name, balance, status, created_at, updated_at
            FROM account
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::AccountNotFound(id))?
        .try_into()
    }

    async fn list_accounts(
        &self,
        owner: OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, owner_id, name, balance, status, created_at, updated_at
            FROM account
            WHERE owner_id = $1
            ORDER BY status, created_at
            LIMIT $2
            OFFSET $3
            "#,
        )
        .bind(*owner.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, type, from_account_id, to_account_id, amount, issued_at
            FROM "transaction"
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Transaction::try_from)
        .transpose()
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn get_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, owner_id, name, balance, status, created_at, updated_at
            FROM account
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::AccountNotFound(id))?
        .try_into()
    }

    async fn set_balance(&mut self, id: AccountId, balance: Money) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE account SET balance = $1, updated_at = NOW() WHERE id = $2")
            .bind(balance.amount())
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn set_status(&mut self, id: AccountId, status: AccountStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE account SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, type, from_account_id, to_account_id, amount, issued_at
            FROM "transaction"
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn insert_transaction(&mut self, record: &Transaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "transaction" (id, type, from_account_id, to_account_id, amount, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.from_account.map(|id| *id.as_uuid()))
        .bind(record.to_account.map(|id| *id.as_uuid()))
        .bind(record.amount.amount())
        .bind(record.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::TransactionExists(record.id)
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
