//! Test that cursors keep their key when other cursors mutate the tree.

use crate::e2e_tests::helpers::*;

#[test]
fn test_insert_before_shifts_other_cursor() {
    let db = new_db();
    insert_all(&db, &(0..10).map(|i| numbered_key(i * 10)).collect::<Vec<_>>());
    let txn = db.try_start_writing_transaction().expect("writer");

    let mut a = txn.create_cursor();
    assert!(a.find_key_index(5).expect("seek"));
    let key = a.key().expect("key");

    let mut b = txn.create_cursor();
    b.upsert(&numbered_key(15), b"new").expect("upsert");

    assert_eq!(a.calc_index().expect("index"), 6);
    assert_eq!(a.key().expect("key"), key);
    assert!(a.find_next(&[]).expect("next"));
    assert_eq!(a.key().expect("key"), numbered_key(60));
}

#[test]
fn test_many_cursors_follow_mixed_mutations() {
    let db = new_db();
    insert_all(&db, &(0..200).map(|i| numbered_key(i * 2)).collect::<Vec<_>>());
    let txn = db.try_start_writing_transaction().expect("writer");

    let mut watchers: Vec<_> = (0..200u64)
        .step_by(20)
        .map(|ordinal| {
            let mut cursor = txn.create_cursor();
            assert!(cursor.find_key_index(ordinal).expect("seek"));
            let key = cursor.key().expect("key");
            (cursor, key)
        })
        .collect();

    let mut writer = txn.create_cursor();
    for i in 0..100 {
        writer.upsert(&numbered_key(i * 4 + 1), b"odd").expect("upsert");
    }
    assert!(writer.find_exact(&numbered_key(398)).expect("find"));
    writer.erase_current().expect("erase");

    for (cursor, key) in &mut watchers {
        assert_eq!(cursor.key().expect("key"), *key);
        let ordinal = cursor.calc_index().expect("index");
        assert!(cursor.find_key_index(ordinal).expect("seek"));
        assert_eq!(cursor.key().expect("key"), *key);
    }
}

#[test]
fn test_erased_key_leaves_cursor_between_neighbours() {
    let db = new_db();
    insert_all(&db, &(0..10).map(numbered_key).collect::<Vec<_>>());
    let txn = db.try_start_writing_transaction().expect("writer");

    let mut a = txn.create_cursor();
    assert!(a.find_exact(&numbered_key(4)).expect("find"));
    let mut b = txn.create_cursor();
    assert!(b.find_exact(&numbered_key(4)).expect("find"));
    b.erase_current().expect("erase");

    assert!(!a.is_valid());
    assert!(a.key().is_err());
    assert!(a.find_previous(&[]).expect("previous"));
    assert_eq!(a.key().expect("key"), numbered_key(3));
}
