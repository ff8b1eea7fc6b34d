use crate::common::{DbError, PageId, Result, SlotId, INVALID_PAGE_ID, PAGE_SIZE};

/// Table page layout:
///
/// +------------------+
/// | Header (16 B)    |  page_id, next/prev page ids, slot count, data start
/// +------------------+
/// | Slot Array       |  grows downward; (offset: u16, length: u16) per slot
/// +------------------+
/// | Free Space       |
/// +------------------+
/// | Tuple Data       |  grows upward from the end of the page
/// +------------------+
///
/// A length of 0 marks a deleted slot. Slots are never reused, so a record
/// id handed out once stays dead after deletion instead of aliasing a new
/// tuple.
const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 4;
const PREV_PAGE_ID_OFFSET: usize = 8;
const NUM_SLOTS_OFFSET: usize = 12;
const FREE_SPACE_END_OFFSET: usize = 14;

const HEADER_SIZE: usize = 16;
const SLOT_SIZE: usize = 4;

/// Largest tuple an empty table page can hold.
pub const fn max_tuple_size() -> usize {
    PAGE_SIZE - HEADER_SIZE - SLOT_SIZE
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
}

fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_page_link(data: &[u8], offset: usize) -> Option<PageId> {
    let id = read_i32(data, offset);
    if id < 0 {
        None
    } else {
        Some(PageId::new(id))
    }
}

fn slot_entry(data: &[u8], slot: u16) -> (u16, u16) {
    let offset = HEADER_SIZE + slot as usize * SLOT_SIZE;
    (read_u16(data, offset), read_u16(data, offset + 2))
}

/// Mutable view over a heap page holding variable-length tuples.
pub struct TablePage<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId) {
        self.data.fill(0);
        write_i32(self.data, PAGE_ID_OFFSET, page_id.as_i32());
        write_i32(self.data, NEXT_PAGE_ID_OFFSET, INVALID_PAGE_ID.as_i32());
        write_i32(self.data, PREV_PAGE_ID_OFFSET, INVALID_PAGE_ID.as_i32());
        write_u16(self.data, NUM_SLOTS_OFFSET, 0);
        write_u16(self.data, FREE_SPACE_END_OFFSET, PAGE_SIZE as u16);
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_i32(self.data, PAGE_ID_OFFSET))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_page_link(self.data, NEXT_PAGE_ID_OFFSET)
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        let id = page_id.unwrap_or(INVALID_PAGE_ID);
        write_i32(self.data, NEXT_PAGE_ID_OFFSET, id.as_i32());
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        read_page_link(self.data, PREV_PAGE_ID_OFFSET)
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        let id = page_id.unwrap_or(INVALID_PAGE_ID);
        write_i32(self.data, PREV_PAGE_ID_OFFSET, id.as_i32());
    }

    pub fn num_slots(&self) -> u16 {
        read_u16(self.data, NUM_SLOTS_OFFSET)
    }

    fn free_space_end(&self) -> u16 {
        read_u16(self.data, FREE_SPACE_END_OFFSET)
    }

    pub fn free_space(&self) -> usize {
        let slots_end = HEADER_SIZE + self.num_slots() as usize * SLOT_SIZE;
        (self.free_space_end() as usize).saturating_sub(slots_end)
    }

    pub fn can_insert(&self, tuple_size: usize) -> bool {
        self.free_space() >= tuple_size + SLOT_SIZE
    }

    /// Appends a tuple and returns its slot id.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<SlotId> {
        if tuple.len() > u16::MAX as usize || !self.can_insert(tuple.len()) {
            return Err(DbError::TupleTooLarge {
                tuple_size: tuple.len(),
                available: self.free_space().saturating_sub(SLOT_SIZE),
            });
        }

        let slot = self.num_slots();
        let tuple_offset = self.free_space_end() - tuple.len() as u16;

        self.data[tuple_offset as usize..tuple_offset as usize + tuple.len()]
            .copy_from_slice(tuple);

        let slot_offset = HEADER_SIZE + slot as usize * SLOT_SIZE;
        write_u16(self.data, slot_offset, tuple_offset);
        write_u16(self.data, slot_offset + 2, tuple.len() as u16);

        write_u16(self.data, NUM_SLOTS_OFFSET, slot + 1);
        write_u16(self.data, FREE_SPACE_END_OFFSET, tuple_offset);

        Ok(SlotId::new(slot))
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<Option<&[u8]>> {
        if slot_id.as_u16() >= self.num_slots() {
            return Err(DbError::InvalidSlot(slot_id));
        }
        let (offset, length) = slot_entry(self.data, slot_id.as_u16());
        if length == 0 {
            return Ok(None);
        }
        Ok(Some(&self.data[offset as usize..offset as usize + length as usize]))
    }

    /// Tombstones a slot. Returns false if it was already deleted.
    pub fn mark_delete(&mut self, slot_id: SlotId) -> Result<bool> {
        if slot_id.as_u16() >= self.num_slots() {
            return Err(DbError::InvalidSlot(slot_id));
        }
        let slot_offset = HEADER_SIZE + slot_id.as_u16() as usize * SLOT_SIZE;
        if read_u16(self.data, slot_offset + 2) == 0 {
            return Ok(false);
        }
        write_u16(self.data, slot_offset, 0);
        write_u16(self.data, slot_offset + 2, 0);
        Ok(true)
    }

    /// Overwrites a live tuple in place when the new bytes fit in the old
    /// footprint. Returns false when they do not; the caller reinserts.
    pub fn update_tuple_in_place(&mut self, slot_id: SlotId, tuple: &[u8]) -> Result<bool> {
        if slot_id.as_u16() >= self.num_slots() {
            return Err(DbError::InvalidSlot(slot_id));
        }
        let (offset, length) = slot_entry(self.data, slot_id.as_u16());
        if length == 0 {
            return Err(DbError::InvalidSlot(slot_id));
        }
        if tuple.len() > length as usize {
            return Ok(false);
        }

        self.data[offset as usize..offset as usize + tuple.len()].copy_from_slice(tuple);
        let slot_offset = HEADER_SIZE + slot_id.as_u16() as usize * SLOT_SIZE;
        write_u16(self.data, slot_offset + 2, tuple.len() as u16);
        Ok(true)
    }

    /// Number of live (non-deleted) tuples.
    pub fn tuple_count(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| slot_entry(self.data, slot).1 != 0)
            .count()
    }
}

/// Read-only view over a heap page.
pub struct TablePageRef<'a> {
    data: &'a [u8],
}

impl<'a> TablePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_i32(self.data, PAGE_ID_OFFSET))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_page_link(self.data, NEXT_PAGE_ID_OFFSET)
    }

    pub fn num_slots(&self) -> u16 {
        read_u16(self.data, NUM_SLOTS_OFFSET)
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<Option<&[u8]>> {
        if slot_id.as_u16() >= self.num_slots() {
            return Err(DbError::InvalidSlot(slot_id));
        }
        let (offset, length) = slot_entry(self.data, slot_id.as_u16());
        if length == 0 {
            return Ok(None);
        }
        Ok(Some(&self.data[offset as usize..offset as usize + length as usize]))
    }

    pub fn tuple_count(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| slot_entry(self.data, slot).1 != 0)
            .count()
    }
}
