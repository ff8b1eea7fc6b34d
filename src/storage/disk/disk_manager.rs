use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{DbError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// DiskManager reads and writes pages against a single database file.
///
/// Page 0 is reserved for the header page and is zero-initialized when the
/// database is created. `allocate_page` extends the file (or recycles a
/// previously deallocated id); `deallocate_page` returns an id to the free
/// set for reuse.
pub struct DiskManager {
    /// File handle. The mutex also serializes the seek/read and seek/write
    /// pairs, which must not interleave.
    file: Mutex<File>,
    db_path: PathBuf,
    /// Pages ever allocated, including the header page.
    num_pages: AtomicI32,
    /// Deallocated page ids available for reuse.
    free_pages: Mutex<BTreeSet<i32>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating it (with a zeroed
    /// header page) if it does not exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as i32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            num_pages: AtomicI32::new(num_pages.max(1)),
            free_pages: Mutex::new(BTreeSet::new()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(HEADER_PAGE_ID, &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer. Reads past the end
    /// of the file (freshly allocated pages) are zero-filled.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        let byte_offset = (page_id.as_i32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut data[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < PAGE_SIZE {
            data[read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        let byte_offset = (page_id.as_i32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page and returns its id. Recycled ids take
    /// precedence; otherwise the file grows by one page. The page contents
    /// on disk are zeroed.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = {
            let mut free = self.free_pages.lock();
            match free.pop_first() {
                Some(id) => PageId::new(id),
                None => PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst)),
            }
        };

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Returns a page id to the free set. The header page is never
    /// deallocated.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }
        if page_id == HEADER_PAGE_ID {
            return Ok(());
        }
        self.free_pages.lock().insert(page_id.as_i32());
        Ok(())
    }

    pub fn num_pages(&self) -> i32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
