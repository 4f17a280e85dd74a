use std::collections::HashSet;

use hybridd_storage::memory::MemoryStore;
use hybridd_storage::{Column, KeyValueStore, WriteBatch};

#[test]
fn column_index_and_name_are_stable() {
    let mut names = HashSet::new();
    for (idx, column) in Column::ALL.iter().copied().enumerate() {
        assert_eq!(column.index(), idx);
        assert!(names.insert(column.as_str()), "duplicate name for {column:?}");
    }
    assert_eq!(Column::BlockIndex.as_str(), "block_index");
    assert_eq!(Column::BlockData.as_str(), "block_data");
}

#[test]
fn columns_do_not_share_keys() {
    let store = MemoryStore::new();
    store.put(Column::BlockIndex, b"id", b"index").expect("put");
    store.put(Column::BlockData, b"id", b"data").expect("put");
    assert_eq!(
        store.get(Column::BlockIndex, b"id").expect("get"),
        Some(b"index".to_vec())
    );
    assert_eq!(store.len(Column::BlockData), 1);
    assert_eq!(store.len(Column::Meta), 0);

    let mut batch = WriteBatch::new();
    batch.delete(Column::BlockIndex, b"id");
    batch.put(Column::Meta, b"tip", b"id");
    store.write_batch(&batch).expect("batch");
    assert!(store.get(Column::BlockIndex, b"id").expect("get").is_none());
    assert_eq!(
        store.get(Column::BlockData, b"id").expect("get"),
        Some(b"data".to_vec())
    );

    let mut seen = Vec::new();
    store
        .for_each_prefix(Column::Meta, b"t", &mut |key, value| {
            seen.push((key.to_vec(), value.to_vec()));
            Ok(())
        })
        .expect("scan");
    assert_eq!(seen, vec![(b"tip".to_vec(), b"id".to_vec())]);
}
