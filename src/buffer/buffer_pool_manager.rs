use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::common::{DbError, FrameId, PageId, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, ReadPageGuard, Replacer, ReplacerPolicy, WritePageGuard};

/// Pool state shared with page-guard release callbacks.
struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Maps resident pages to their frames
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// Frames holding no page. A frame is in exactly one of the free list
    /// or the page table's value set.
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: Box<dyn Replacer>,
}

impl PoolState {
    /// Guard release path: OR the dirty flag, drop the pin, and hand the
    /// frame to the replacer when the last pin goes away.
    fn release(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.as_usize()];
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => self.replacer.unpin(frame_id),
            Some(_) => {}
            None => error!("pin underflow on frame {}", frame_id),
        }
    }
}

/// BufferPoolManager mediates between logical pages on disk and a fixed
/// array of in-memory frames. Fetching a page pins its frame and returns a
/// latch-holding guard; dropping the guard unpins it. Victims come from the
/// free list first and the replacement policy second.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, policy: ReplacerPolicy, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as i32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            page_table: Mutex::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: policy.build(pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new page and returns a write guard on it (pin count 1,
    /// contents zeroed, clean). Fails with `PoolExhausted` when every frame
    /// is pinned.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(id) => id,
            Err(e) => {
                self.state.free_list.lock().push_back(frame_id);
                return Err(e);
            }
        };

        frame.set_page_id(page_id);
        frame.pin();
        self.state.page_table.lock().insert(page_id, frame_id);
        self.state.replacer.pin(frame_id);

        Ok(self.make_write_guard(page_id, frame_id))
    }

    /// Fetches a page for shared access. Blocks while a writer holds the
    /// frame latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);

        let guard = unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |fid, is_dirty| state.release(fid, is_dirty)),
            )
        };
        Ok(guard)
    }

    /// Fetches a page for exclusive access.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.make_write_guard(page_id, frame_id))
    }

    /// Writes a resident page back to disk and clears its dirty flag.
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        let frame_id = match self.state.page_table.lock().get(&page_id) {
            Some(&fid) => fid,
            None => return Ok(false),
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every dirty resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = self.state.page_table.lock().keys().copied().collect();
        for page_id in resident {
            let frame_id = match self.state.page_table.lock().get(&page_id) {
                Some(&fid) => fid,
                None => continue,
            };
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Removes a page from the pool and deallocates it on disk. Fails with
    /// `PagePinned` while any pin is outstanding; deleting a non-resident
    /// page only touches the disk allocator.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        {
            let mut page_table = self.state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                let frame = &self.state.frames[frame_id.as_usize()];
                if frame.pin_count() > 0 {
                    return Err(DbError::PagePinned(page_id));
                }
                page_table.remove(&page_id);
                frame.reset();
                self.state.replacer.pin(frame_id);
                self.state.free_list.lock().push_back(frame_id);
            }
        }

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count of a resident page, or None if not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state
            .page_table
            .lock()
            .get(&page_id)
            .map(|&fid| self.state.frames[fid.as_usize()].pin_count())
    }

    /// Sum of all pin counts; zero means no caller leaked a guard.
    pub fn total_pin_count(&self) -> u32 {
        self.state.frames.iter().map(|f| f.pin_count()).sum()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    fn make_write_guard(&self, page_id: PageId, frame_id: FrameId) -> WritePageGuard {
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        let state = Arc::clone(&self.state);
        unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |fid, is_dirty| state.release(fid, is_dirty)),
            )
        }
    }

    /// Pins the frame holding `page_id`, reading it from disk on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        {
            let page_table = self.state.page_table.lock();
            if let Some(&frame_id) = page_table.get(&page_id) {
                self.state.frames[frame_id.as_usize()].pin();
                self.state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        // Read outside the page-table lock; the frame is not yet mapped, so
        // no other thread can reach it.
        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        let mut page_table = self.state.page_table.lock();
        if let Some(&existing) = page_table.get(&page_id) {
            // Another thread fetched the same page while we read from
            // disk. Pin its frame before releasing the page table so it
            // cannot be evicted in between, then return ours to the free
            // list.
            self.state.frames[existing.as_usize()].pin();
            self.state.replacer.pin(existing);
            drop(page_table);

            frame.reset();
            self.state.free_list.lock().push_back(frame_id);
            return Ok(existing);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();
        page_table.insert(page_id, frame_id);
        self.state.replacer.pin(frame_id);

        Ok(frame_id)
    }

    /// Produces an empty frame: free list first, then a replacer victim
    /// (written back first if dirty). Disk I/O happens with no pool lock
    /// held.
    fn acquire_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.state.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        loop {
            let frame_id = match self.state.replacer.victim() {
                Some(fid) => fid,
                None => return Err(DbError::PoolExhausted),
            };
            let frame = &self.state.frames[frame_id.as_usize()];

            let old_page_id = {
                let mut page_table = self.state.page_table.lock();
                // A concurrent fetch may have re-pinned this frame between
                // victim selection and now; it is no longer ours.
                if frame.pin_count() > 0 {
                    continue;
                }
                // A pin/unpin cycle in that same window can have put the
                // frame back in the eligible set; purge it so no second
                // caller is handed this victim.
                self.state.replacer.pin(frame_id);
                let old = frame.page_id();
                if old.is_valid() {
                    page_table.remove(&old);
                }
                old
            };

            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
            }
            debug!("evicting {} from frame {}", old_page_id, frame_id);
            frame.reset();
            return Ok(frame_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, ReplacerPolicy::Lru, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_new_page_is_pinned() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(bpm.get_pin_count(page_id), Some(1));

        drop(guard);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.free_frame_count(), 9);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
            guard.page_id()
        };

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard.data()[100], 255);
    }

    #[test]
    fn test_flush_persists() {
        let (bpm, temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.page_id()
        };
        bpm.flush_page(page_id).unwrap();
        drop(bpm);

        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, ReplacerPolicy::Lru, dm);
        let guard = bpm2.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[test]
    fn test_eviction_when_full() {
        let (bpm, _temp) = create_bpm(3);

        let mut pages = Vec::new();
        for i in 0..3 {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = i as u8;
            pages.push(guard.page_id());
        }
        assert_eq!(bpm.free_frame_count(), 0);

        // All guards dropped, so a fourth page evicts one of the three.
        let guard = bpm.new_page().unwrap();
        let new_page = guard.page_id();
        drop(guard);
        assert!(!pages.contains(&new_page));

        // The evicted pages still read back correctly from disk.
        for (i, &pid) in pages.iter().enumerate() {
            let guard = bpm.fetch_page_read(pid).unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }

    #[test]
    fn test_pool_exhaustion() {
        let (bpm, _temp) = create_bpm(2);

        let _g1 = bpm.new_page().unwrap();
        let _g2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(DbError::PoolExhausted)));
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();

        assert!(matches!(
            bpm.delete_page(page_id),
            Err(DbError::PagePinned(_))
        ));

        drop(guard);
        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_fetch_invalid_page_id() {
        let (bpm, _temp) = create_bpm(4);
        assert!(bpm.fetch_page_read(crate::common::INVALID_PAGE_ID).is_err());
        assert!(bpm.flush_page(crate::common::INVALID_PAGE_ID).is_err());
    }
}
