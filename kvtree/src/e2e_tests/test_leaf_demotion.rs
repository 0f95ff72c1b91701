//! Test that packed leaves demote to spread storage under a small budget.

use crate::e2e_tests::helpers::*;
use crate::storage::btree::validate_tree;

#[test]
fn test_small_budget_demotes_and_keeps_contents() {
    let db = db_with_packed_limit(32);
    let keys_in: Vec<Vec<u8>> = (0..200u32)
        .map(|i| {
            let mut key = numbered_key(i);
            key.extend_from_slice(b"-padding");
            key
        })
        .collect();
    insert_all(&db, &keys_in);

    let txn = reader(&db);
    let stats = txn
        .inspect(validate_tree)
        .expect("inspect")
        .expect("valid tree");
    assert!(stats.spread_leaves > 0);
    assert_eq!(stats.keys, 200);
    assert_eq!(keys(&txn), keys_in);
}

#[test]
fn test_default_budget_keeps_leaves_packed() {
    let db = new_db();
    insert_all(&db, &(0..500).map(numbered_key).collect::<Vec<_>>());
    let stats = reader(&db)
        .inspect(validate_tree)
        .expect("inspect")
        .expect("valid tree");
    assert_eq!(stats.spread_leaves, 0);
}
