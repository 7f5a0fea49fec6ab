use std::{fs::File, io::Write};

use anyhow::{Context, Result};
use broke_ledger::{
    bin_utils::{RowError, Service},
    config::LedgerConfig,
    logging,
    processor::retry::RetryPolicy,
    store::{in_memory::InMemoryStore, postgres::PostgresStore},
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LedgerConfig::from_env().context("Invalid configuration")?;
    logging::init(&config.logging);

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let mut stdout = std::io::stdout();
    let retry = RetryPolicy::from(config.retry);
    match &config.database {
        Some(database) => {
            let store = PostgresStore::connect(database)
                .await
                .context("Failed to connect to the ledger database")?;
            store.migrate().await.context("Failed to apply the ledger schema")?;
            Service {
                input: file,
                output: &mut stdout,
                store,
                retry,
                error_printer: Box::new(print_error),
            }
            .run()
            .await?;
        }
        None => {
            info!("DATABASE_URL is not set, running on the in-memory store");
            Service {
                input: file,
                output: &mut stdout,
                store: InMemoryStore::default(),
                retry,
                error_printer: Box::new(print_error),
            }
            .run()
            .await?;
        }
    }
    stdout.flush().context("Failed to flush stdout")
}

fn print_error(line: u64, err: RowError) {
    match err {
        // business rejections are part of normal operation
        RowError::Ledger(err) if err.is_rejection() => {
            debug!(line, code = err.code(), "Rejected: {err}")
        }
        err => eprintln!("Error at line {line}: {err}"),
    }
}
