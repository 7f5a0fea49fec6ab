use std::{
    str::from_utf8,
    sync::{Arc, Mutex},
};

use broke_ledger::{
    bin_utils::{RowError, Service},
    processor::retry::RetryPolicy,
    store::in_memory::InMemoryStore,
};

const TEST_FILE: &str = include_str!("ledger.csv");

fn describe(err: &RowError) -> String {
    match err {
        RowError::Parse(_) => "parse".to_string(),
        RowError::MissingColumn { column, .. } => format!("missing {column}"),
        RowError::Ledger(err) => err.code().to_string(),
    }
}

#[tokio::test]
async fn process_ledger_batch() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let collected = errors.clone();

    let mut output = Vec::new();
    let service = Service {
        input: TEST_FILE.as_bytes(),
        output: &mut output,
        store: InMemoryStore::default(),
        retry: RetryPolicy::default(),
        error_printer: Box::new(move |line, err| {
            collected.lock().unwrap().push((line, describe(&err)));
        }),
    };
    service.run().await.unwrap();

    let lines: Vec<&str> = from_utf8(&output).unwrap().lines().collect();
    assert_eq!(
        lines,
        vec![
            "account,owner,name,balance,status",
            "0190f2a0-0000-7000-8000-000000000001,0190f2a0-0000-7000-8000-0000000000ff,checking,70.00,active",
            "0190f2a0-0000-7000-8000-000000000002,0190f2a0-0000-7000-8000-0000000000ff,savings,79.50,active",
            "0190f2a0-0000-7000-8000-000000000003,0190f2a0-0000-7000-8000-0000000000ff,old,0.00,inactive",
        ]
    );

    let errors = errors.lock().unwrap().clone();
    assert_eq!(
        errors,
        vec![
            (7, "DUPLICATE_TRANSACTION".to_string()),
            (8, "INSUFFICIENT_BALANCE".to_string()),
            (10, "INVALID_AMOUNT".to_string()),
            (13, "ACCOUNT_INACTIVE".to_string()),
            (14, "missing amount".to_string()),
            (15, "parse".to_string()),
            (16, "ACCOUNT_NOT_FOUND".to_string()),
        ]
    );
}

#[tokio::test]
async fn header_only_batch_prints_nothing() {
    let mut output = Vec::new();
    let service = Service {
        input: "type,tx,account,to,amount,owner,name\n".as_bytes(),
        output: &mut output,
        store: InMemoryStore::default(),
        retry: RetryPolicy::default(),
        error_printer: Box::new(|line, err| panic!("unexpected error at line {line}: {err}")),
    };
    service.run().await.unwrap();
    // serde's header row is written with the first record, so nothing here
    assert_eq!(from_utf8(&output).unwrap(), "");
}
