//! Test that a writer never alters nodes reachable from older versions.

use crate::e2e_tests::helpers::*;
use crate::storage::btree::validate_tree;

#[test]
fn test_snapshot_traversal_identical_after_mutation() {
    let db = new_db();
    insert_all(&db, &(0..2000).map(numbered_key).collect::<Vec<_>>());
    let snapshot = reader(&db);
    let before = contents(&snapshot);
    let fingerprint = snapshot.fingerprint().expect("fingerprint");

    write(&db, |cursor| {
        for i in (0..2000).step_by(3) {
            cursor.upsert(&numbered_key(i), b"overwritten").expect("upsert");
        }
        for i in 5000..5100 {
            cursor.upsert(&numbered_key(i), b"new").expect("upsert");
        }
        assert_eq!(cursor.erase_all(&[0, 0, 3]).expect("erase"), 256);
    });

    assert_eq!(contents(&snapshot), before);
    assert_eq!(snapshot.fingerprint().expect("fingerprint"), fingerprint);
    snapshot
        .inspect(validate_tree)
        .expect("inspect")
        .expect("old version still valid");
}

#[test]
fn test_untouched_subtrees_are_shared() {
    let db = new_db();
    insert_all(&db, &(0..3000).map(numbered_key).collect::<Vec<_>>());
    let old = reader(&db);

    write(&db, |cursor| {
        cursor.upsert(&numbered_key(2999), b"x").expect("upsert");
    });
    let new = reader(&db);

    let shared = old
        .inspect(|old_root| {
            new.inspect(|new_root| {
                let mut old_stack = Vec::new();
                let mut new_stack = Vec::new();
                assert!(old_root.fill_stack_by_index(&mut old_stack, 0));
                assert!(new_root.fill_stack_by_index(&mut new_stack, 0));
                let old_leaf = &old_stack.last().expect("leaf").node;
                let new_leaf = &new_stack.last().expect("leaf").node;
                std::sync::Arc::ptr_eq(old_leaf, new_leaf)
            })
        })
        .expect("inspect")
        .expect("inspect");
    assert!(shared, "first leaf should be shared between versions");
}
