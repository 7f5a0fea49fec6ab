/// Exact decimal amounts. Balances and transaction amounts never touch
/// floating point.
pub mod money;

/// Account state and the rules for changing it.
/// Postings are handled into events, which are then applied to the balance.
pub mod account;

/// Committed transaction records and their caller-supplied ids.
pub mod transaction;

/// Ledger commands and their validation, done before any lock is taken.
pub mod command;

/// Global order in which account rows are locked by a transfer.
pub mod lock_order;

/// Storage seam: a [`store::LedgerStore`] hands out units of work with
/// row locks. Comes with an in-memory and a PostgreSQL implementation.
pub mod store;

/// Transaction processor interface, its store-backed implementation and the
/// retry coordinator for transfers.
pub mod processor;

/// Runtime settings, read from the environment (and a `.env` file if present).
pub mod config;

/// Global tracing subscriber setup.
pub mod logging;

/// CSV batch driver used by the binary. It lives here so the integration
/// tests can run it too.
pub mod bin_utils;
