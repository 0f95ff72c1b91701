//! Test that an in-order traversal yields strictly increasing keys.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;

#[test]
fn test_random_inserts_traverse_in_order() {
    let db = new_db();
    let mut rng = StdRng::seed_from_u64(11);
    let keys: Vec<Vec<u8>> = (0..3000)
        .map(|_| {
            let len = rng.random_range(1..12);
            (0..len).map(|_| rng.random_range(0..4u8)).collect()
        })
        .collect();
    insert_all(&db, &keys);

    let seen = keys_of(&db);
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    let mut expected = keys;
    expected.sort();
    expected.dedup();
    assert_eq!(seen, expected);
}

#[test]
fn test_reverse_walk_is_strictly_decreasing() {
    let db = new_db();
    let keys: Vec<Vec<u8>> = (0..500u32).rev().map(numbered_key).collect();
    insert_all(&db, &keys);

    let txn = reader(&db);
    let mut cursor = txn.create_cursor();
    let mut previous: Option<Vec<u8>> = None;
    let mut walked = 0;
    while cursor.find_previous(&[]).expect("previous") {
        let key = cursor.key().expect("key");
        if let Some(previous) = &previous {
            assert!(key < *previous);
        }
        previous = Some(key);
        walked += 1;
    }
    assert_eq!(walked, 500);
}

#[test]
fn test_prefix_keys_sort_before_extensions() {
    let db = new_db();
    insert_all(&db, &[&b"ab"[..], b"a", b"abc", b"b", b""]);
    let expected: Vec<Vec<u8>> = [&b""[..], b"a", b"ab", b"abc", b"b"]
        .iter()
        .map(|k| k.to_vec())
        .collect();
    assert_eq!(keys_of(&db), expected);
}

fn keys_of(db: &crate::storage::KeyValueDb) -> Vec<Vec<u8>> {
    keys(&reader(db))
}
