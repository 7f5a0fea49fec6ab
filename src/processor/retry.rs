use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{
    account::AccountId,
    money::Money,
    transaction::{Transaction, TransactionId},
};

use super::{LedgerError, TransactionProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Attempt `n + 1` starts `n * backoff` after attempt `n` failed.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Saturates instead of overflowing on absurd configured values.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Retries transfers that lost a serialization conflict.
///
/// The same transaction id is reused on every attempt. If an earlier attempt
/// did commit and only its acknowledgement got lost, the retry sees
/// [`LedgerError::DuplicateTransaction`] and reports success. Deposits,
/// withdrawals and lookups are passed through untouched.
pub struct RetryCoordinator<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> RetryCoordinator<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P> TransactionProcessor for RetryCoordinator<P>
where
    P: TransactionProcessor,
{
    async fn deposit(
        &self,
        tx_id: TransactionId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        self.inner.deposit(tx_id, to, amount).await
    }

    async fn withdrawal(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        self.inner.withdrawal(tx_id, from, amount).await
    }

    async fn transfer(
        &self,
        tx_id: TransactionId,
        from: AccountId,
        to: AccountId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.transfer(tx_id, from, to, amount).await {
                Ok(()) => return Ok(()),
                Err(LedgerError::DuplicateTransaction(_)) if attempt > 1 => {
                    info!(tx_id = %tx_id, attempt, "Transfer already committed by an earlier attempt");
                    return Ok(());
                }
                Err(LedgerError::SerializationConflict) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        tx_id = %tx_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transfer hit a serialization conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if matches!(err, LedgerError::SerializationConflict) {
                        error!(tx_id = %tx_id, attempts = attempt, "Transfer gave up after repeated conflicts");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
        self.inner.get_transaction(tx_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use super::*;

    /// Replays scripted transfer outcomes and counts every call.
    #[derive(Default)]
    struct Scripted {
        transfers: Mutex<VecDeque<Result<(), LedgerError>>>,
        transfer_calls: AtomicU32,
        deposit_calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<(), LedgerError>>) -> Self {
            Self {
                transfers: Mutex::new(outcomes.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TransactionProcessor for Scripted {
        async fn deposit(&self, _: TransactionId, _: AccountId, _: Money) -> Result<(), LedgerError> {
            self.deposit_calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::SerializationConflict)
        }

        async fn withdrawal(
            &self,
            _: TransactionId,
            _: AccountId,
            _: Money,
        ) -> Result<(), LedgerError> {
            Ok(())
        }

        async fn transfer(
            &self,
            _: TransactionId,
            _: AccountId,
            _: AccountId,
            _: Money,
        ) -> Result<(), LedgerError> {
            self.transfer_calls.fetch_add(1, Ordering::SeqCst);
            self.transfers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn get_transaction(&self, tx_id: TransactionId) -> Result<Transaction, LedgerError> {
            Err(LedgerError::TransactionNotFound(tx_id))
        }
    }

    fn coordinator(outcomes: Vec<Result<(), LedgerError>>) -> RetryCoordinator<Scripted> {
        RetryCoordinator::new(
            Scripted::new(outcomes),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        )
    }

    async fn transfer(coordinator: &RetryCoordinator<Scripted>) -> Result<(), LedgerError> {
        coordinator
            .transfer(
                TransactionId::new(),
                AccountId::new(),
                AccountId::new(),
                Money::from_minor_units(100),
            )
            .await
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(2), Duration::from_millis(100));
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            backoff: Duration::from_millis(u64::MAX),
        };
        assert_eq!(policy.delay_after(2000), Duration::MAX);
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let coordinator = coordinator(vec![
            Err(LedgerError::SerializationConflict),
            Err(LedgerError::SerializationConflict),
            Ok(()),
        ]);
        transfer(&coordinator).await.unwrap();
        assert_eq!(coordinator.inner().transfer_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let coordinator = coordinator(vec![
            Err(LedgerError::SerializationConflict),
            Err(LedgerError::SerializationConflict),
            Err(LedgerError::SerializationConflict),
            Ok(()),
        ]);
        let err = transfer(&coordinator).await.unwrap_err();
        assert!(matches!(err, LedgerError::SerializationConflict));
        assert_eq!(coordinator.inner().transfer_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicate_after_conflict_means_success() {
        let coordinator = coordinator(vec![
            Err(LedgerError::SerializationConflict),
            Err(LedgerError::DuplicateTransaction(TransactionId::new())),
        ]);
        transfer(&coordinator).await.unwrap();
        assert_eq!(coordinator.inner().transfer_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_on_first_attempt_is_surfaced() {
        let coordinator = coordinator(vec![Err(LedgerError::DuplicateTransaction(
            TransactionId::new(),
        ))]);
        let err = transfer(&coordinator).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTransaction(_)));
        assert_eq!(coordinator.inner().transfer_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        for err in [
            LedgerError::InsufficientBalance(AccountId::new()),
            LedgerError::StoreUnavailable("connection reset".to_string()),
        ] {
            let coordinator = coordinator(vec![Err(err)]);
            assert!(transfer(&coordinator).await.is_err());
            assert_eq!(coordinator.inner().transfer_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn deposits_pass_through_once() {
        let coordinator = coordinator(vec![]);
        let err = coordinator
            .deposit(TransactionId::new(), AccountId::new(), Money::from_minor_units(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SerializationConflict));
        assert_eq!(coordinator.inner().deposit_calls.load(Ordering::SeqCst), 1);
    }
}
