use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback invoked when a guard is dropped: `(frame_id, is_dirty)`.
/// The pool uses it to OR the dirty flag and unpin the frame.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(FrameId, bool) + Send + Sync>;

struct PageGuardBase {
    page_id: PageId,
    frame_id: FrameId,
    /// Keeps the frame alive for the guard's lifetime
    _frame: Arc<FrameHeader>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame_id: frame.frame_id(),
            _frame: frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.frame_id, self.is_dirty);
        }
    }
}

/// RAII guard for read access to a page: holds the frame's read latch and
/// one pin, releasing both (latch first) when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must hold a pin on the frame so it outlives this guard.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        // The lifetime is tied to the Arc kept in the base, not to a borrow.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Unlatch before unpinning
        self.data_guard.take();
        self.base.release();
    }
}

/// RAII guard for write access to a page: holds the frame's write latch and
/// one pin. Accessing `data_mut` marks the page dirty; the drop path hands
/// the dirty flag back to the pool after releasing the latch.
pub struct WritePageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// The caller must hold a pin on the frame so it outlives this guard.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_read_page_guard_releases() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.copy_from(&data);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = unsafe {
            ReadPageGuard::new(
                PageId::new(1),
                frame.clone(),
                Box::new(move |_, _| {
                    released_clone.store(true, Ordering::SeqCst);
                }),
            )
        };

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_page_guard_reports_dirty() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let dirty = Arc::new(AtomicBool::new(false));
        let dirty_clone = dirty.clone();

        let mut guard = unsafe {
            WritePageGuard::new(
                PageId::new(1),
                frame.clone(),
                Box::new(move |_, is_dirty| {
                    dirty_clone.store(is_dirty, Ordering::SeqCst);
                }),
            )
        };

        guard.data_mut()[0] = 42;
        drop(guard);

        assert!(dirty.load(Ordering::SeqCst));

        let mut read_data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut read_data);
        assert_eq!(read_data[0], 42);
    }

    #[test]
    fn test_write_page_guard_clean_when_untouched() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));

        let dirty = Arc::new(AtomicBool::new(true));
        let dirty_clone = dirty.clone();

        let guard = unsafe {
            WritePageGuard::new(
                PageId::new(1),
                frame.clone(),
                Box::new(move |_, is_dirty| {
                    dirty_clone.store(is_dirty, Ordering::SeqCst);
                }),
            )
        };

        drop(guard);
        assert!(!dirty.load(Ordering::SeqCst));
    }
}
