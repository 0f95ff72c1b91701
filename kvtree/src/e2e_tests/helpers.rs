//! Common helpers for end-to-end tests.

use crate::config::EngineConfig;
use crate::simulation::collect_contents;
use crate::storage::{Cursor, KeyValueDb, Transaction};

/// Fresh store with the default configuration.
#[must_use]
pub fn new_db() -> KeyValueDb {
    KeyValueDb::new()
}

/// Fresh store whose packed leaves hold at most `limit` key bytes.
#[must_use]
pub fn db_with_packed_limit(limit: usize) -> KeyValueDb {
    let config = EngineConfig::default()
        .with_packed_key_limit(limit)
        .expect("limit in range");
    KeyValueDb::with_config(config)
}

/// Run `f` with a cursor in a new writing transaction and commit it.
pub fn write(db: &KeyValueDb, f: impl FnOnce(&mut Cursor)) {
    let txn = db.try_start_writing_transaction().expect("writer");
    let mut cursor = txn.create_cursor();
    f(&mut cursor);
    drop(cursor);
    txn.commit().expect("commit");
}

/// Commit `keys`, each with its own bytes as value.
pub fn insert_all<K: AsRef<[u8]>>(db: &KeyValueDb, keys: &[K]) {
    write(db, |cursor| {
        for key in keys {
            cursor
                .upsert(key.as_ref(), key.as_ref())
                .expect("upsert");
        }
    });
}

/// Four-byte big-endian key, so numeric and byte order agree.
#[must_use]
pub fn numbered_key(i: u32) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

#[must_use]
pub fn reader(db: &KeyValueDb) -> Transaction {
    db.start_read_only_transaction().expect("reader")
}

/// Every key/value visible to `txn`, in order.
#[must_use]
pub fn contents(txn: &Transaction) -> Vec<(Vec<u8>, Vec<u8>)> {
    collect_contents(txn).expect("iterate")
}

/// Every key visible to `txn`, in order.
#[must_use]
pub fn keys(txn: &Transaction) -> Vec<Vec<u8>> {
    contents(txn).into_iter().map(|(key, _)| key).collect()
}
