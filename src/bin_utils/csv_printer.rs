use std::io::Write;

use csv::Writer;
use serde::Serialize;

use crate::account::{Account, AccountId, AccountStatus, OwnerId};

#[derive(Debug, Serialize)]
pub struct AccountLine {
    pub account: AccountId,
    pub owner: OwnerId,
    pub name: String,
    /// Rendered with two decimals.
    pub balance: String,
    pub status: AccountStatus,
}

impl From<Account> for AccountLine {
    fn from(account: Account) -> Self {
        Self {
            account: account.id,
            owner: account.owner,
            name: account.name,
            balance: account.balance.to_string(),
            status: account.status,
        }
    }
}

pub fn print_accounts<W>(
    output: &mut W,
    accounts: impl Iterator<Item = AccountLine>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for acc in accounts {
        if let Err(err) = writer.serialize(acc) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    // Ensure all data is flushed to the output
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
