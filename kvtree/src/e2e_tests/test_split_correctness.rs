//! Test that the first leaf split grows the tree to height two.

use crate::e2e_tests::helpers::*;
use crate::storage::btree::{MAX_MEMBERS_IN_LEAF, validate_tree};

#[test]
fn test_thirty_one_sequential_keys_split_once() {
    let db = new_db();
    let count = u32::try_from(MAX_MEMBERS_IN_LEAF).expect("small") + 1;
    insert_all(&db, &(0..count).map(numbered_key).collect::<Vec<_>>());

    let txn = reader(&db);
    let stats = txn
        .inspect(validate_tree)
        .expect("inspect")
        .expect("valid tree");
    assert_eq!(stats.height, 2);
    assert_eq!(stats.branches, 1);
    assert_eq!(stats.packed_leaves + stats.spread_leaves, 2);

    let mut cursor = txn.create_cursor();
    for i in 0..count {
        assert!(cursor.find_exact(&numbered_key(i)).expect("find"));
        assert_eq!(&cursor.value().expect("value")[..], &numbered_key(i)[..]);
    }
}

#[test]
fn test_thirty_keys_stay_in_one_leaf() {
    let db = new_db();
    insert_all(&db, &(0..30).map(numbered_key).collect::<Vec<_>>());
    let height = reader(&db)
        .inspect(crate::storage::btree::Root::height)
        .expect("inspect");
    assert_eq!(height, 1);
}
