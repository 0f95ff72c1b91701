//! Test that stale writers fail with a retryable conflict and succeed on retry.

use crate::e2e_tests::helpers::*;
use crate::storage::{ConflictReason, CursorError, KeyValueDb, TransactionError};

fn increment(db: &KeyValueDb) -> Result<(), CursorError> {
    let txn = db.start_transaction()?;
    let value = txn.ulong(0)?;
    txn.set_ulong(0, value + 1)?;
    txn.create_cursor().upsert(&value.to_be_bytes(), b"")?;
    txn.commit()?;
    Ok(())
}

#[test]
fn test_stale_snapshot_retry_loop() {
    let db = new_db();
    let stale = db.start_transaction().expect("txn");
    increment(&db).expect("first increment");

    let error = stale.set_ulong(0, 100).expect_err("stale");
    assert_eq!(error, TransactionError::Conflict(ConflictReason::StaleSnapshot));
    assert!(error.is_retryable());
    drop(stale);

    let mut attempts = 0;
    loop {
        attempts += 1;
        match increment(&db) {
            Ok(()) => break,
            Err(CursorError::Transaction(e)) if e.is_retryable() => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(attempts, 1);
    let txn = reader(&db);
    assert_eq!(txn.ulong(0).expect("get"), 2);
    assert_eq!(txn.key_value_count().expect("count"), 2);
}

#[test]
fn test_read_only_write_reports_read_only() {
    let db = new_db();
    let txn = reader(&db);
    let error = txn.set_ulong(0, 1).expect_err("read-only");
    assert_eq!(error, TransactionError::ReadOnly);
}
