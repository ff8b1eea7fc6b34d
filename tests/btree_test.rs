use std::sync::Arc;

use bramble::buffer::{BufferPoolManager, ReplacerPolicy};
use bramble::common::{PageId, RecordId, SlotId};
use bramble::index::btree_page::{page_type, BTreePageType, InternalNodeRef, LeafNodeRef};
use bramble::index::{BPlusTree, IntegerComparator};
use bramble::storage::disk::DiskManager;

use tempfile::NamedTempFile;

const KEY_SIZE: usize = 4;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(
        pool_size,
        ReplacerPolicy::Lru,
        disk_manager,
    ));
    (bpm, temp_file)
}

fn small_tree(bpm: &Arc<BufferPoolManager>) -> BPlusTree {
    // Tiny fan-out so splits and merges happen after a handful of keys.
    BPlusTree::new(
        "test_idx",
        Arc::clone(bpm),
        Arc::new(IntegerComparator),
        KEY_SIZE,
        3,
        3,
    )
    .unwrap()
}

fn key(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

fn rid(v: i32) -> RecordId {
    RecordId::new(PageId::new(v), SlotId::new(0))
}

fn collect_keys(tree: &BPlusTree) -> Vec<i32> {
    let mut iter = tree.begin().unwrap();
    let mut keys = Vec::new();
    while let Some((k, _)) = iter.next().unwrap() {
        keys.push(i32::from_le_bytes(k.try_into().unwrap()));
    }
    keys
}

#[test]
fn test_empty_tree() {
    let (bpm, _temp) = create_bpm(16);
    let tree = small_tree(&bpm);

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);
    assert!(!tree.remove(&key(1)).unwrap());
    assert!(tree.begin().unwrap().is_end());
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_insert_and_lookup() {
    let (bpm, _temp) = create_bpm(16);
    let tree = small_tree(&bpm);

    assert!(tree.insert(&key(10), rid(10)).unwrap());
    assert!(tree.insert(&key(20), rid(20)).unwrap());
    assert!(tree.insert(&key(30), rid(30)).unwrap());

    assert_eq!(tree.get_value(&key(10)).unwrap(), Some(rid(10)));
    assert_eq!(tree.get_value(&key(20)).unwrap(), Some(rid(20)));
    assert_eq!(tree.get_value(&key(30)).unwrap(), Some(rid(30)));
    assert_eq!(tree.get_value(&key(40)).unwrap(), None);

    // Duplicate keys are rejected, not overwritten.
    assert!(!tree.insert(&key(20), rid(99)).unwrap());
    assert_eq!(tree.get_value(&key(20)).unwrap(), Some(rid(20)));

    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_split_shape_boundary_scenario() {
    let (bpm, _temp) = create_bpm(16);
    let tree = small_tree(&bpm);

    for v in 1..=4 {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }

    // Inserting 4 overflowed the root leaf: two leaves [1,2] and [3,4]
    // under a root whose single separator is 3.
    let root_id = tree.root_page_id();
    {
        let root_guard = bpm.fetch_page_read(root_id).unwrap();
        assert_eq!(page_type(root_guard.data()), BTreePageType::Internal);
        let root = InternalNodeRef::new(root_guard.data(), KEY_SIZE);
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), key(3));

        let left_guard = bpm.fetch_page_read(root.child_at(0)).unwrap();
        let left = LeafNodeRef::new(left_guard.data(), KEY_SIZE);
        assert_eq!(left.size(), 2);
        assert_eq!(left.key_at(0), key(1));
        assert_eq!(left.key_at(1), key(2));
        assert_eq!(left.next_page_id(), root.child_at(1));

        let right_guard = bpm.fetch_page_read(root.child_at(1)).unwrap();
        let right = LeafNodeRef::new(right_guard.data(), KEY_SIZE);
        assert_eq!(right.size(), 2);
        assert_eq!(right.key_at(0), key(3));
        assert_eq!(right.key_at(1), key(4));
    }

    // 5 lands in the right leaf, filling it to its maximum without
    // another split.
    assert!(tree.insert(&key(5), rid(5)).unwrap());
    {
        let root_guard = bpm.fetch_page_read(root_id).unwrap();
        let root = InternalNodeRef::new(root_guard.data(), KEY_SIZE);
        assert_eq!(root.size(), 2);
        assert_eq!(root.key_at(1), key(3));

        let right_guard = bpm.fetch_page_read(root.child_at(1)).unwrap();
        let right = LeafNodeRef::new(right_guard.data(), KEY_SIZE);
        assert_eq!(right.size(), 3);
    }

    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 5]);
    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_delete_redistributes_boundary_scenario() {
    let (bpm, _temp) = create_bpm(16);
    let tree = small_tree(&bpm);

    for v in 1..=5 {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    // Leaves are [1,2] and [3,4,5]. Removing 1 under-fills the left
    // leaf; its right sibling has entries to spare, so one moves over
    // and the separator follows.
    assert!(tree.remove(&key(1)).unwrap());

    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    let root = InternalNodeRef::new(root_guard.data(), KEY_SIZE);
    assert_eq!(root.size(), 2);
    assert_eq!(root.key_at(1), key(4));

    let left_guard = bpm.fetch_page_read(root.child_at(0)).unwrap();
    let left = LeafNodeRef::new(left_guard.data(), KEY_SIZE);
    assert_eq!(left.size(), 2);
    assert_eq!(left.key_at(0), key(2));
    assert_eq!(left.key_at(1), key(3));
    drop(left_guard);
    drop(root_guard);

    assert_eq!(collect_keys(&tree), vec![2, 3, 4, 5]);
    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_delete_collapses_root() {
    let (bpm, _temp) = create_bpm(16);
    let tree = small_tree(&bpm);

    for v in 1..=5 {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    tree.remove(&key(1)).unwrap();

    // Leaves [2,3] and [4,5]: removing 2 forces a merge and the root
    // collapses back to a single leaf.
    assert!(tree.remove(&key(2)).unwrap());
    let root_guard = bpm.fetch_page_read(tree.root_page_id()).unwrap();
    assert_eq!(page_type(root_guard.data()), BTreePageType::Leaf);
    let leaf = LeafNodeRef::new(root_guard.data(), KEY_SIZE);
    assert_eq!(leaf.size(), 3);
    drop(root_guard);

    // Draining the rest empties the tree and resets the root.
    for v in [3, 4, 5] {
        assert!(tree.remove(&key(v)).unwrap());
    }
    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(3)).unwrap(), None);
    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_sequential_insert_many() {
    let (bpm, _temp) = create_bpm(64);
    let tree = small_tree(&bpm);

    for v in 0..500 {
        assert!(tree.insert(&key(v), rid(v)).unwrap(), "insert {}", v);
    }
    for v in 0..500 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "find {}", v);
    }

    assert_eq!(collect_keys(&tree), (0..500).collect::<Vec<_>>());
    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_reverse_insert_many() {
    let (bpm, _temp) = create_bpm(64);
    let tree = small_tree(&bpm);

    for v in (0..300).rev() {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    assert_eq!(collect_keys(&tree), (0..300).collect::<Vec<_>>());
    tree.check_integrity().unwrap();
}

#[test]
fn test_random_round_trip_leaves_empty_tree() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(64);
    let tree = small_tree(&bpm);

    let mut keys: Vec<i32> = (0..400).collect();
    keys.shuffle(&mut thread_rng());
    for &v in &keys {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }
    tree.check_integrity().unwrap();

    keys.shuffle(&mut thread_rng());
    for &v in &keys {
        assert!(tree.remove(&key(v)).unwrap(), "remove {}", v);
        assert_eq!(tree.get_value(&key(v)).unwrap(), None);
    }

    assert!(tree.is_empty());
    assert!(tree.begin().unwrap().is_end());
    tree.check_integrity().unwrap();
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_range_iteration_from_key() {
    let (bpm, _temp) = create_bpm(64);
    let tree = small_tree(&bpm);

    for v in 0..50 {
        tree.insert(&key(v * 10), rid(v)).unwrap();
    }

    // Position at the first key >= 123.
    let mut iter = tree.begin_at(&key(123)).unwrap();
    let (first, _) = iter.next().unwrap().unwrap();
    assert_eq!(first, key(130));

    let mut rest = vec![130];
    while let Some((k, _)) = iter.next().unwrap() {
        rest.push(i32::from_le_bytes(k.try_into().unwrap()));
    }
    assert_eq!(rest, (13..50).map(|v| v * 10).collect::<Vec<_>>());

    // Past the last key the iterator starts exhausted.
    let iter = tree.begin_at(&key(9999)).unwrap();
    assert!(iter.is_end());
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_root_persists_through_header_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(
            16,
            ReplacerPolicy::Lru,
            disk_manager,
        ));
        let tree = small_tree(&bpm);
        for v in 0..100 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(
            16,
            ReplacerPolicy::Lru,
            disk_manager,
        ));
        // Reopening by name restores the root from the header page.
        let tree = small_tree(&bpm);
        assert!(!tree.is_empty());
        for v in 0..100 {
            assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
        }
        tree.check_integrity().unwrap();
    }
}
