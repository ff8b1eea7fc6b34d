use crate::common::{DbError, PageId, Result, PAGE_SIZE};

/// Header page layout (always page 0):
///
/// | Field       | Offset | Size |
/// |-------------|--------|------|
/// | num_records | 0      | 4    |
/// | records     | 4      | 36 each |
///
/// Each record maps an index name (32 bytes, zero-padded) to its root page
/// id (4 bytes). The B+tree updates its record whenever the root moves.
const NUM_RECORDS_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of index records the header page can hold.
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn pad_name(name: &str) -> Result<[u8; NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_SIZE {
        return Err(DbError::IndexNameTooLong(name.to_string()));
    }
    let mut padded = [0u8; NAME_SIZE];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

fn read_num_records(data: &[u8]) -> usize {
    u32::from_le_bytes(data[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4].try_into().unwrap())
        as usize
}

fn record_root(data: &[u8], slot: usize) -> PageId {
    let offset = RECORDS_OFFSET + slot * RECORD_SIZE + NAME_SIZE;
    PageId::new(i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()))
}

fn find_record(data: &[u8], name: &[u8; NAME_SIZE]) -> Option<usize> {
    let num = read_num_records(data);
    (0..num).find(|&slot| {
        let offset = RECORDS_OFFSET + slot * RECORD_SIZE;
        &data[offset..offset + NAME_SIZE] == name
    })
}

/// Mutable view of the header page.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn num_records(&self) -> usize {
        read_num_records(self.data)
    }

    /// Registers a new index name. Returns false if the name already exists.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let padded = pad_name(name)?;
        if find_record(self.data, &padded).is_some() {
            return Ok(false);
        }

        let num = self.num_records();
        if num >= MAX_HEADER_RECORDS {
            return Err(DbError::HeaderFull);
        }

        let offset = RECORDS_OFFSET + num * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].copy_from_slice(&padded);
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
        self.data[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4]
            .copy_from_slice(&((num + 1) as u32).to_le_bytes());
        Ok(true)
    }

    /// Rewrites the root page id for an existing record. Returns false if
    /// the name is not registered.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        let padded = pad_name(name)?;
        match find_record(self.data, &padded) {
            Some(slot) => {
                let offset = RECORDS_OFFSET + slot * RECORD_SIZE + NAME_SIZE;
                self.data[offset..offset + 4]
                    .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a record, compacting the tail over it. Returns false if the
    /// name is not registered.
    pub fn delete_record(&mut self, name: &str) -> Result<bool> {
        let padded = pad_name(name)?;
        let slot = match find_record(self.data, &padded) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        let num = self.num_records();
        let start = RECORDS_OFFSET + (slot + 1) * RECORD_SIZE;
        let end = RECORDS_OFFSET + num * RECORD_SIZE;
        let dest = RECORDS_OFFSET + slot * RECORD_SIZE;
        self.data.copy_within(start..end, dest);
        self.data[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4]
            .copy_from_slice(&((num - 1) as u32).to_le_bytes());
        Ok(true)
    }

    pub fn get_root_id(&self, name: &str) -> Result<Option<PageId>> {
        let padded = pad_name(name)?;
        Ok(find_record(self.data, &padded).map(|slot| record_root(self.data, slot)))
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn num_records(&self) -> usize {
        read_num_records(self.data)
    }

    pub fn get_root_id(&self, name: &str) -> Result<Option<PageId>> {
        let padded = pad_name(name)?;
        Ok(find_record(self.data, &padded).map(|slot| record_root(self.data, slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;

    #[test]
    fn test_header_page_insert_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        assert!(header.insert_record("idx_a", PageId::new(3)).unwrap());
        assert!(header.insert_record("idx_b", INVALID_PAGE_ID).unwrap());
        assert!(!header.insert_record("idx_a", PageId::new(9)).unwrap());

        assert_eq!(header.get_root_id("idx_a").unwrap(), Some(PageId::new(3)));
        assert_eq!(header.get_root_id("idx_b").unwrap(), Some(INVALID_PAGE_ID));
        assert_eq!(header.get_root_id("missing").unwrap(), None);
    }

    #[test]
    fn test_header_page_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        header.insert_record("idx", PageId::new(1)).unwrap();
        assert!(header.update_record("idx", PageId::new(7)).unwrap());
        assert_eq!(header.get_root_id("idx").unwrap(), Some(PageId::new(7)));

        assert!(!header.update_record("missing", PageId::new(2)).unwrap());
    }

    #[test]
    fn test_header_page_delete_compacts() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        header.insert_record("a", PageId::new(1)).unwrap();
        header.insert_record("b", PageId::new(2)).unwrap();
        header.insert_record("c", PageId::new(3)).unwrap();

        assert!(header.delete_record("b").unwrap());
        assert_eq!(header.num_records(), 2);
        assert_eq!(header.get_root_id("a").unwrap(), Some(PageId::new(1)));
        assert_eq!(header.get_root_id("c").unwrap(), Some(PageId::new(3)));
        assert_eq!(header.get_root_id("b").unwrap(), None);
    }

    #[test]
    fn test_header_page_name_too_long() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data);
        header.init();

        let long = "x".repeat(NAME_SIZE + 1);
        assert!(header.insert_record(&long, PageId::new(1)).is_err());
    }
}
