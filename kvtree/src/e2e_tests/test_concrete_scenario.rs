//! Test a small prefix-seek and erase scenario end to end.

use crate::e2e_tests::helpers::*;

#[test]
fn test_prefix_seek_and_erase_first() {
    let db = new_db();
    let txn = db.try_start_writing_transaction().expect("writer");
    let mut cursor = txn.create_cursor();
    cursor.upsert(&[0x01], b"one").expect("upsert");
    cursor.upsert(&[0x02, 0x00], b"two-zero").expect("upsert");
    cursor.upsert(&[0x02, 0x01], b"two-one").expect("upsert");

    assert!(cursor.find_first(&[0x02]).expect("find"));
    assert_eq!(cursor.key().expect("key"), vec![0x02, 0x00]);

    let last = txn
        .inspect(|root| root.find_last_with_prefix(&[0x02]))
        .expect("inspect");
    assert_eq!(last, Some(2));
    assert!(cursor.find_last(&[0x02]).expect("find"));
    assert_eq!(cursor.key().expect("key"), vec![0x02, 0x01]);

    assert!(cursor.find_key_index(0).expect("seek"));
    cursor.erase_current().expect("erase");
    assert_eq!(txn.key_value_count().expect("count"), 2);
    assert!(cursor.find_key_index(0).expect("seek"));
    assert_eq!(cursor.key().expect("key"), vec![0x02, 0x00]);
    drop(cursor);
    txn.commit().expect("commit");

    assert_eq!(
        keys(&reader(&db)),
        vec![vec![0x02, 0x00], vec![0x02, 0x01]]
    );
}
