//! Runs a CSV batch of ledger operations and prints the resulting accounts.
//! The binary is a thin wrapper around [`Service`]; the integration tests
//! drive it directly.

use std::{
    collections::HashSet,
    io::{Read, Write},
};

use anyhow::Result;
use thiserror::Error;

use crate::{
    account::{AccountId, NewAccount},
    processor::{
        LedgerError, TransactionProcessor,
        ledger_processor::LedgerProcessor,
        retry::{RetryCoordinator, RetryPolicy},
    },
    store::LedgerStore,
    transaction::TransactionId,
};
use csv_parser::{CsvLedgerParser, LedgerRow, RowKind};
use csv_printer::{AccountLine, print_accounts};
pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Parse(#[from] csv::Error),
    #[error("Column `{column}` is required for {kind:?}")]
    MissingColumn { kind: RowKind, column: &'static str },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct Service<'w, R, W: 'w, S> {
    pub input: R,
    pub output: &'w mut W,
    pub store: S,
    pub retry: RetryPolicy,
    pub error_printer: Box<dyn FnMut(u64, RowError)>,
}

impl<'w, R, W, S> Service<'w, R, W, S>
where
    R: Read,
    W: Write + 'w,
    S: LedgerStore,
{
    pub async fn run(self) -> Result<()> {
        let Service {
            input,
            output,
            store,
            retry,
            mut error_printer,
        } = self;
        let ledger = RetryCoordinator::new(LedgerProcessor::new(store), retry);

        // accounts are printed in the order they first show up
        let mut seen = Vec::new();
        let mut known = HashSet::new();
        for (line, row) in CsvLedgerParser::new(input) {
            let outcome = match row {
                Ok(row) => {
                    for id in std::iter::once(row.account).chain(row.to) {
                        if known.insert(id) {
                            seen.push(id);
                        }
                    }
                    process_row(&ledger, row).await
                }
                Err(err) => Err(err.into()),
            };
            if let Err(err) = outcome {
                error_printer(line, err);
            }
        }

        let mut accounts = Vec::with_capacity(seen.len());
        for id in seen {
            match ledger.inner().get_account(id).await {
                Ok(account) => accounts.push(AccountLine::from(account)),
                Err(LedgerError::AccountNotFound(_)) => {}
                Err(err) => anyhow::bail!("Failed to read account {id}: {err}"),
            }
        }
        print_accounts(output, accounts.into_iter())
    }
}

async fn process_row<S>(
    ledger: &RetryCoordinator<LedgerProcessor<S>>,
    row: LedgerRow,
) -> Result<(), RowError>
where
    S: LedgerStore,
{
    let kind = row.kind;
    let required = |column: &'static str| RowError::MissingColumn { kind, column };
    // every request gets its own id, generated before the first attempt
    let tx_id = row.tx.unwrap_or_else(TransactionId::new);

    match kind {
        RowKind::Open => {
            let owner = row.owner.ok_or_else(|| required("owner"))?;
            let name = row.name.ok_or_else(|| required("name"))?;
            ledger
                .inner()
                .open_account(NewAccount {
                    id: row.account,
                    owner,
                    name,
                })
                .await?;
        }
        RowKind::Deposit => {
            let amount = row.amount.ok_or_else(|| required("amount"))?;
            ledger.deposit(tx_id, row.account, amount).await?;
        }
        RowKind::Withdrawal => {
            let amount = row.amount.ok_or_else(|| required("amount"))?;
            ledger.withdrawal(tx_id, row.account, amount).await?;
        }
        RowKind::Transfer => {
            let to: AccountId = row.to.ok_or_else(|| required("to"))?;
            let amount = row.amount.ok_or_else(|| required("amount"))?;
            ledger.transfer(tx_id, row.account, to, amount).await?;
        }
        RowKind::Close => {
            ledger.inner().close_account(row.account).await?;
        }
    }
    Ok(())
}
