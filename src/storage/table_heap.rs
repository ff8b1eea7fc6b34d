use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, PageId, RecordId, Result, SlotId};
use crate::concurrency::Transaction;
use crate::tuple::{SchemaRef, Tuple};

use super::page::{max_tuple_size, TablePage, TablePageRef};

/// TableHeap stores tuples in a doubly linked list of slotted pages fetched
/// through the buffer pool. Record ids are stable: a deleted slot stays
/// dead, and an update that no longer fits in place is reinserted under a
/// new record id which the caller must propagate to its indexes.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Creates a heap with one empty page.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let mut guard = bpm.new_page()?;
        let first_page_id = guard.page_id();
        TablePage::new(guard.data_mut()).init(first_page_id);
        drop(guard);

        Ok(Self { bpm, first_page_id })
    }

    /// Opens an existing heap rooted at `first_page_id`.
    pub fn open(bpm: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self { bpm, first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Inserts a tuple, first-fit over the page chain, appending a fresh
    /// page when no existing page has room.
    pub fn insert_tuple(&self, tuple: &Tuple, _txn: &Transaction) -> Result<RecordId> {
        let bytes = tuple
            .to_bytes()
            .ok_or_else(|| DbError::Serialization("tuple does not match its schema".into()))?;
        self.insert_bytes(&bytes)
    }

    /// Reads the tuple at `rid`. Returns None for a deleted slot.
    pub fn get_tuple(
        &self,
        rid: RecordId,
        schema: &SchemaRef,
        _txn: &Transaction,
    ) -> Result<Option<Tuple>> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = TablePageRef::new(guard.data());
        match page.get_tuple(rid.slot_id)? {
            Some(bytes) => {
                let tuple = Tuple::from_bytes(Arc::clone(schema), bytes)
                    .ok_or_else(|| DbError::Serialization("stored tuple is malformed".into()))?;
                Ok(Some(tuple))
            }
            None => Ok(None),
        }
    }

    /// Replaces the tuple at `rid`. Returns the record id the new version
    /// lives at: `rid` itself when the update fit in place, or a fresh one
    /// when the tuple had to move.
    pub fn update_tuple(
        &self,
        new_tuple: &Tuple,
        rid: RecordId,
        _txn: &Transaction,
    ) -> Result<RecordId> {
        let bytes = new_tuple
            .to_bytes()
            .ok_or_else(|| DbError::Serialization("tuple does not match its schema".into()))?;

        {
            let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
            let mut page = TablePage::new(guard.data_mut());
            if page.update_tuple_in_place(rid.slot_id, &bytes)? {
                return Ok(rid);
            }
            page.mark_delete(rid.slot_id)?;
        }

        self.insert_bytes(&bytes)
    }

    /// Tombstones the tuple at `rid`. Returns false if it was already gone.
    pub fn mark_delete(&self, rid: RecordId, _txn: &Transaction) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        let mut page = TablePage::new(guard.data_mut());
        page.mark_delete(rid.slot_id)
    }

    /// Iterates all live tuples in page order, then slot order.
    pub fn iter(&self, schema: SchemaRef) -> TableIterator {
        TableIterator {
            bpm: Arc::clone(&self.bpm),
            schema,
            page_id: Some(self.first_page_id),
            next_slot: 0,
        }
    }

    fn insert_bytes(&self, bytes: &[u8]) -> Result<RecordId> {
        if bytes.len() > max_tuple_size() {
            return Err(DbError::TupleTooLarge {
                tuple_size: bytes.len(),
                available: max_tuple_size(),
            });
        }

        let mut page_id = self.first_page_id;
        loop {
            let mut guard = self.bpm.fetch_page_write(page_id)?;
            let mut page = TablePage::new(guard.data_mut());

            if page.can_insert(bytes.len()) {
                let slot = page.insert_tuple(bytes)?;
                return Ok(RecordId::new(page_id, slot));
            }

            match page.next_page_id() {
                Some(next) => page_id = next,
                None => {
                    let mut new_guard = self.bpm.new_page()?;
                    let new_id = new_guard.page_id();
                    let mut new_page = TablePage::new(new_guard.data_mut());
                    new_page.init(new_id);
                    new_page.set_prev_page_id(Some(page_id));
                    let slot = new_page.insert_tuple(bytes)?;
                    page.set_next_page_id(Some(new_id));
                    return Ok(RecordId::new(new_id, slot));
                }
            }
        }
    }
}

/// Cursor over a table heap. Each step fetches the current page under a
/// read guard, so no latch is held between calls.
pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    schema: SchemaRef,
    page_id: Option<PageId>,
    next_slot: u16,
}

impl TableIterator {
    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        while let Some(page_id) = self.page_id {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let page = TablePageRef::new(guard.data());

            while self.next_slot < page.num_slots() {
                let slot = SlotId::new(self.next_slot);
                self.next_slot += 1;
                if let Some(bytes) = page.get_tuple(slot)? {
                    let tuple = Tuple::from_bytes(Arc::clone(&self.schema), bytes).ok_or_else(
                        || DbError::Serialization("stored tuple is malformed".into()),
                    )?;
                    return Ok(Some((tuple, RecordId::new(page_id, slot))));
                }
            }

            self.page_id = page.next_page_id();
            self.next_slot = 0;
        }
        Ok(None)
    }
}
