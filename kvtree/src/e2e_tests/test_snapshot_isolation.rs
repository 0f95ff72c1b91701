//! Test that readers keep seeing the version they started on.

use crate::e2e_tests::helpers::*;

#[test]
fn test_reader_does_not_see_later_insert() {
    let db = new_db();
    insert_all(&db, &[b"a", b"b"]);
    let before = reader(&db);

    insert_all(&db, &[b"k"]);
    write(&db, |cursor| {
        cursor.upsert(b"z", b"1").expect("upsert");
        assert!(cursor.find_exact(b"a").expect("find"));
        cursor.erase_current().expect("erase");
    });

    let mut cursor = before.create_cursor();
    assert!(!cursor.find_exact(b"k").expect("find"));
    assert_eq!(before.key_value_count().expect("count"), 2);
    assert_eq!(keys(&before), vec![b"a".to_vec(), b"b".to_vec()]);

    let after = reader(&db);
    assert_eq!(keys(&after), vec![b"b".to_vec(), b"k".to_vec(), b"z".to_vec()]);
}

#[test]
fn test_reader_does_not_see_uncommitted_writes() {
    let db = new_db();
    insert_all(&db, &[b"a"]);
    let writer = db.try_start_writing_transaction().expect("writer");
    writer.create_cursor().upsert(b"b", b"v").expect("upsert");

    let concurrent = reader(&db);
    assert_eq!(concurrent.key_value_count().expect("count"), 1);
    writer.commit().expect("commit");
    assert_eq!(concurrent.key_value_count().expect("count"), 1);
    assert_eq!(reader(&db).key_value_count().expect("count"), 2);
}

#[test]
fn test_ulongs_are_versioned() {
    let db = new_db();
    let txn = db.try_start_writing_transaction().expect("writer");
    txn.set_ulong(0, 7).expect("set");
    txn.commit().expect("commit");
    let old = reader(&db);

    let txn = db.try_start_writing_transaction().expect("writer");
    assert_eq!(txn.ulong(0).expect("get"), 7);
    txn.set_ulong(0, 8).expect("set");
    txn.commit().expect("commit");

    assert_eq!(old.ulong(0).expect("get"), 7);
    assert_eq!(reader(&db).ulong(0).expect("get"), 8);
}
