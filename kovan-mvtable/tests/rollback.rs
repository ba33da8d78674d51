use kovan_mvtable::{MvccError, MvccTable};

#[test]
fn test_tight_table_rolls_back() {
    let table: MvccTable = MvccTable::new(1, 1).unwrap();
    table.put(1, 10).unwrap();
    let before = table.bucket_versions(0).unwrap();

    let err = table.put(2, 20).unwrap_err();
    assert_eq!(
        err,
        MvccError::TableFull {
            key: 2,
            attempts: 1
        }
    );

    assert_eq!(table.bucket_versions(0).unwrap(), before);
    assert_eq!(table.get(1), Some(10));
    assert_eq!(table.get(2), None);
}

#[test]
fn test_rollback_with_repeated_displacement() {
    // Every displacement lands in the only bucket, so one transaction
    // stacks several nodes there before giving up.
    let table: MvccTable = MvccTable::new(1, 16).unwrap();
    table.put(1, 10).unwrap();

    for key in 2..10u64 {
        assert!(matches!(
            table.put(key, key),
            Err(MvccError::TableFull { key: k, attempts: 16 }) if k == key
        ));
        assert_eq!(table.bucket_versions(0), Some(vec![1, 0]));
    }

    assert_eq!(table.get(1), Some(10));
    assert_eq!(table.txn_counter(), 9);
    assert_eq!(table.last_committed(), 1);
}

#[test]
fn test_rollback_across_buckets() {
    let table: MvccTable = MvccTable::new(2, 3).unwrap();
    table.put(2, 20).unwrap(); // bucket 0
    table.put(1, 10).unwrap(); // bucket 1

    // hash1(14) = 0, hash2(14) = 1: evicts 1 into bucket 0, which evicts 2,
    // which has nowhere else to go.
    assert!(matches!(
        table.put(14, 140),
        Err(MvccError::TableFull { key: 14, .. })
    ));

    assert_eq!(table.bucket_versions(0), Some(vec![1, 0]));
    assert_eq!(table.bucket_versions(1), Some(vec![2, 0]));
    assert_eq!(table.get(1), Some(10));
    assert_eq!(table.get(2), Some(20));
    assert_eq!(table.get(14), None);
}

#[test]
fn test_table_usable_after_rollback() {
    let table: MvccTable = MvccTable::new(1, 4).unwrap();
    table.put(1, 10).unwrap();
    assert!(table.put(2, 20).is_err());

    // Updating the resident still layers a version in place.
    table.put(1, 11).unwrap();
    assert_eq!(table.get(1), Some(11));

    // Freeing the bucket lets the rejected key in.
    assert_eq!(table.delete(1), Ok(true));
    table.put(2, 20).unwrap();
    assert_eq!(table.get(2), Some(20));
    assert_eq!(table.get(1), None);
}

#[test]
fn test_error_display() {
    let err = MvccError::TableFull {
        key: 77,
        attempts: 16,
    };
    assert_eq!(
        err.to_string(),
        "Key 77 couldn't be inserted due to a tight table (16 displacements)"
    );
    assert_eq!(
        MvccError::ReservedKey.to_string(),
        "Key 0 is reserved for the empty sentinel"
    );
}
