use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result};

use super::btree_page::LeafNodeRef;

/// Range cursor over a B+tree. Holds the current leaf pinned under a read
/// latch; advancing past the leaf's last entry releases it before fetching
/// the sibling, so at most one leaf is latched at a time.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    key_size: usize,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl BTreeIterator {
    pub(crate) fn end(bpm: Arc<BufferPoolManager>, key_size: usize) -> Self {
        Self {
            bpm,
            key_size,
            leaf: None,
            index: 0,
        }
    }

    pub(crate) fn at(
        bpm: Arc<BufferPoolManager>,
        key_size: usize,
        leaf: ReadPageGuard,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            key_size,
            leaf: Some(leaf),
            index,
        }
    }

    /// True once the iterator has run off the last leaf.
    pub fn is_end(&self) -> bool {
        self.leaf.is_none()
    }

    /// Yields the entry under the cursor and advances, hopping to the next
    /// leaf through the sibling chain when the current one is exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        let guard = match self.leaf.as_ref() {
            Some(guard) => guard,
            None => return Ok(None),
        };

        let (key, rid, size, next_page) = {
            let leaf = LeafNodeRef::new(guard.data(), self.key_size);
            (
                leaf.key_at(self.index).to_vec(),
                leaf.rid_at(self.index),
                leaf.size(),
                leaf.next_page_id(),
            )
        };

        self.index += 1;
        if self.index >= size {
            // Release the current leaf before latching its sibling.
            self.leaf = None;
            self.index = 0;
            if next_page.is_valid() {
                self.leaf = Some(self.bpm.fetch_page_read(next_page)?);
            }
        }

        Ok(Some((key, rid)))
    }
}
