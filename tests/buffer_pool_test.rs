use std::sync::Arc;

use bramble::buffer::{BufferPoolManager, ReplacerPolicy};
use bramble::common::DbError;
use bramble::storage::disk::DiskManager;

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize, policy: ReplacerPolicy) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (BufferPoolManager::new(pool_size, policy, dm), temp_file)
}

#[test]
fn test_single_frame_pool_boundary_scenario() {
    let (bpm, _temp) = create_bpm(1, ReplacerPolicy::Lru);

    // The only frame is taken and pinned by the first page.
    let mut guard = bpm.new_page().unwrap();
    let p1 = guard.page_id();
    assert_eq!(bpm.get_pin_count(p1), Some(1));

    // With the frame pinned there is nothing to evict.
    assert!(matches!(bpm.new_page(), Err(DbError::PoolExhausted)));

    // Dirty the page and release it; the next allocation evicts it.
    guard.data_mut()[0] = 0xAB;
    drop(guard);

    let guard2 = bpm.new_page().unwrap();
    let p2 = guard2.page_id();
    assert_ne!(p1, p2);
    drop(guard2);

    // P1 was written back during eviction and reads back intact.
    let guard = bpm.fetch_page_read(p1).unwrap();
    assert_eq!(guard.data()[0], 0xAB);
}

#[test]
fn test_fetch_miss_reads_from_disk() {
    let (bpm, _temp) = create_bpm(2, ReplacerPolicy::Lru);

    let mut pages = Vec::new();
    for i in 0..4u8 {
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[0] = i;
        pages.push(guard.page_id());
    }

    // Only two frames exist, so earlier pages were evicted; every page
    // still fetches back with its data.
    for (i, &pid) in pages.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_clock_policy_pool() {
    let (bpm, _temp) = create_bpm(3, ReplacerPolicy::Clock);

    let mut pages = Vec::new();
    for i in 0..6u8 {
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[0] = i;
        pages.push(guard.page_id());
    }

    for (i, &pid) in pages.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_flush_all_pages() {
    let (bpm, temp) = create_bpm(8, ReplacerPolicy::Lru);

    let mut pages = Vec::new();
    for i in 0..5u8 {
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[0] = i + 10;
        pages.push(guard.page_id());
    }
    bpm.flush_all_pages().unwrap();
    drop(bpm);

    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm2 = BufferPoolManager::new(8, ReplacerPolicy::Lru, dm);
    for (i, &pid) in pages.iter().enumerate() {
        let guard = bpm2.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8 + 10);
    }
}

#[test]
fn test_delete_page_lifecycle() {
    let (bpm, _temp) = create_bpm(4, ReplacerPolicy::Lru);

    let guard = bpm.new_page().unwrap();
    let pid = guard.page_id();

    assert!(matches!(bpm.delete_page(pid), Err(DbError::PagePinned(_))));
    drop(guard);

    assert!(bpm.delete_page(pid).unwrap());
    assert_eq!(bpm.get_pin_count(pid), None);
    assert_eq!(bpm.free_frame_count(), 4);

    // The freed page id is recycled by the next allocation.
    let guard = bpm.new_page().unwrap();
    assert_eq!(guard.page_id(), pid);
}

#[test]
fn test_write_guard_blocks_readers() {
    use std::thread;
    use std::time::Duration;

    let (bpm, _temp) = create_bpm(4, ReplacerPolicy::Lru);
    let bpm = Arc::new(bpm);

    let mut guard = bpm.new_page().unwrap();
    let pid = guard.page_id();
    guard.data_mut()[0] = 1;

    let reader_bpm = Arc::clone(&bpm);
    let reader = thread::spawn(move || {
        let guard = reader_bpm.fetch_page_read(pid).unwrap();
        guard.data()[0]
    });

    // Give the reader a moment to block on the frame latch, finish the
    // write, then let it through.
    thread::sleep(Duration::from_millis(50));
    guard.data_mut()[0] = 2;
    drop(guard);

    assert_eq!(reader.join().unwrap(), 2);
}

#[test]
fn test_many_pages_no_pin_leak() {
    let (bpm, _temp) = create_bpm(4, ReplacerPolicy::Lru);

    for _ in 0..50 {
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[7] = 7;
    }
    assert_eq!(bpm.total_pin_count(), 0);
}

#[test]
fn test_free_frames_shrink_as_pages_arrive() {
    let (bpm, _temp) = create_bpm(4, ReplacerPolicy::Lru);

    for n in 1..=4 {
        let guard = bpm.new_page().unwrap();
        drop(guard);
        assert_eq!(bpm.free_frame_count(), 4 - n);
    }

    // Beyond pool capacity the free list stays empty; frames are reused
    // through eviction instead.
    let guard = bpm.new_page().unwrap();
    drop(guard);
    assert_eq!(bpm.free_frame_count(), 0);
}
