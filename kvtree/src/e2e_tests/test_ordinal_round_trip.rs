//! Test that seeking by ordinal and reading the ordinal back agree.

use crate::e2e_tests::helpers::*;

#[test]
fn test_every_ordinal_round_trips() {
    let db = new_db();
    let ids: Vec<u32> = (0..1500).map(|i| i * 7919 % 10_007).collect();
    insert_all(&db, &ids.iter().map(|&i| numbered_key(i)).collect::<Vec<_>>());

    let txn = reader(&db);
    let sorted = keys(&txn);
    let mut cursor = txn.create_cursor();
    for (i, key) in sorted.iter().enumerate() {
        let ordinal = i as u64;
        assert!(cursor.find_key_index(ordinal).expect("seek"));
        assert_eq!(cursor.calc_index().expect("index"), ordinal);
        assert_eq!(&cursor.key().expect("key"), key);
    }
    assert!(!cursor.find_key_index(sorted.len() as u64).expect("seek"));
    assert!(!cursor.is_valid());
}

#[test]
fn test_find_reports_ordinal_of_neighbour() {
    let db = new_db();
    insert_all(&db, &[&b"b"[..], b"d", b"f"]);
    let txn = reader(&db);
    let mut cursor = txn.create_cursor();
    cursor.find(b"e", 0).expect("find");
    assert_eq!(cursor.calc_index().expect("index"), 1);
    assert_eq!(cursor.key().expect("key"), b"d");
    cursor.find(b"a", 0).expect("find");
    assert_eq!(cursor.calc_index().expect("index"), 0);
}
