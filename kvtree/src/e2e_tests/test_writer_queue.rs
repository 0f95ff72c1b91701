//! Test that queued writers are served in order on the latest version.

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_queued_writers_build_on_each_other() {
    let db = new_db();
    let first = db.start_writing_transaction().await.expect("writer");
    let mut waiters: Vec<_> = (0..3).map(|_| Box::pin(db.start_writing_transaction())).collect();
    for waiter in &mut waiters {
        assert!(futures::poll!(waiter).is_pending());
    }
    assert_eq!(db.queued_writers().expect("queue"), 3);

    first.create_cursor().upsert(b"0", b"").expect("upsert");
    first.commit().expect("commit");

    for (i, waiter) in waiters.into_iter().enumerate() {
        let txn = waiter.await.expect("granted");
        assert_eq!(txn.key_value_count().expect("count"), i as u64 + 1);
        let key = (i + 1).to_string();
        txn.create_cursor().upsert(key.as_bytes(), b"").expect("upsert");
        txn.commit().expect("commit");
    }

    assert_eq!(db.last_committed_transaction_id().expect("id"), 4);
    assert_eq!(keys(&reader(&db)).len(), 4);
}

#[tokio::test]
async fn test_writer_tasks_on_runtime() {
    let db = new_db();
    let mut handles = Vec::new();
    for i in 0..8u32 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let txn = db.start_writing_transaction().await.expect("writer");
            txn.create_cursor()
                .upsert(&numbered_key(i), b"task")
                .expect("upsert");
            txn.commit().expect("commit");
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }
    assert_eq!(reader(&db).key_value_count().expect("count"), 8);
}
