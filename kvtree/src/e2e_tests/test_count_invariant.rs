//! Test that the key count tracks inserts and erases exactly.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::e2e_tests::helpers::*;

#[test]
fn test_count_after_inserts_and_erases() {
    let db = new_db();
    let n = 1200u32;
    let mut ids: Vec<u32> = (0..n).collect();
    ids.shuffle(&mut StdRng::seed_from_u64(3));
    insert_all(&db, &ids.iter().map(|&i| numbered_key(i)).collect::<Vec<_>>());

    let m = 450usize;
    write(&db, |cursor| {
        for &id in &ids[..m] {
            assert!(cursor.find_exact(&numbered_key(id)).expect("find"));
            cursor.erase_current().expect("erase");
        }
    });

    let txn = reader(&db);
    assert_eq!(txn.key_value_count().expect("count"), u64::from(n) - m as u64);
    assert_eq!(keys(&txn).len(), n as usize - m);
}

#[test]
fn test_overwrite_does_not_count() {
    let db = new_db();
    insert_all(&db, &[b"k"]);
    write(&db, |cursor| {
        for round in 0..10u8 {
            cursor.upsert(b"k", &[round]).expect("upsert");
        }
    });
    let txn = reader(&db);
    assert_eq!(txn.key_value_count().expect("count"), 1);
    assert_eq!(contents(&txn), vec![(b"k".to_vec(), vec![9])]);
}

#[test]
fn test_range_erase_counts() {
    let db = new_db();
    insert_all(&db, &(0..1000).map(numbered_key).collect::<Vec<_>>());
    write(&db, |cursor| {
        let txn_count_before = cursor.key_value_count(&[]).expect("count");
        assert_eq!(txn_count_before, 1000);
        assert_eq!(cursor.erase_all(&[0, 0, 1]).expect("erase"), 256);
        assert_eq!(cursor.key_value_count(&[]).expect("count"), 744);
    });
    assert_eq!(reader(&db).key_value_count().expect("count"), 744);
}
