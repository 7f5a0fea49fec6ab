use std::io::Read;

use csv::{Reader, StringRecord, Trim};
use serde::Deserialize;

use crate::{
    account::{AccountId, OwnerId},
    money::Money,
    transaction::TransactionId,
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Open,
    Deposit,
    Withdrawal,
    Transfer,
    Close,
}

/// One line of a ledger batch. Which columns are required depends on `kind`.
#[derive(Debug, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub tx: Option<TransactionId>,
    pub account: AccountId,
    pub to: Option<AccountId>,
    pub amount: Option<Money>,
    pub owner: Option<OwnerId>,
    pub name: Option<String>,
}

/// Parses ledger operations in CSV format, yielding each row with the line it
/// starts on.
pub struct CsvLedgerParser<R> {
    reader: Reader<R>,
    headers: Option<StringRecord>,
    record: StringRecord,
    done: bool,
}

impl<R> CsvLedgerParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            reader,
            headers: None,
            record: StringRecord::new(),
            done: false,
        }
    }
}

impl<R> Iterator for CsvLedgerParser<R>
where
    R: Read,
{
    type Item = (u64, Result<LedgerRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.headers.is_none() {
            match self.reader.headers() {
                Ok(headers) => self.headers = Some(headers.clone()),
                Err(err) => {
                    self.done = true;
                    return Some((1, Err(err)));
                }
            }
        }

        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = self.record.position().map_or(0, |pos| pos.line());
                Some((line, self.record.deserialize(self.headers.as_ref())))
            }
            Err(err) => {
                // a broken source won't recover, a malformed record might
                self.done = err.is_io_error();
                let line = err.position().map_or(0, |pos| pos.line());
                Some((line, Err(err)))
            }
        }
    }
}
