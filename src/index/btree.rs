use std::cmp::Ordering;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{DbError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::page::HeaderPage;

use super::btree_iterator::BTreeIterator;
use super::btree_page::{
    internal_capacity, leaf_capacity, node_size, page_type, parent_of, set_parent, BTreePageType,
    InternalNode, InternalNodeRef, LeafNode, LeafNodeRef,
};
use super::key_comparator::KeyComparator;

/// Per-operation scratch state for the crabbing protocol: the held root
/// latch, the ordered set of write-latched pages, and pages scheduled for
/// deletion once every latch is released.
struct LatchContext<'a> {
    root_guard: Option<MutexGuard<'a, PageId>>,
    write_set: Vec<WritePageGuard>,
    deleted: Vec<PageId>,
}

impl LatchContext<'_> {
    /// Releases the root latch and every held ancestor, in acquisition
    /// order. Called when the descent reaches a safe node.
    fn release_ancestors(&mut self) {
        self.root_guard = None;
        self.write_set.clear();
    }
}

/// A persistent B+tree index over fixed-width keys. Nodes live in pages
/// borrowed from the buffer pool; the root page id is mirrored to the
/// header page whenever it changes.
///
/// Concurrency follows latch crabbing: a descent latches each child before
/// releasing its parent, and a mutating descent keeps the chain of unsafe
/// ancestors write-latched until the mutation cannot propagate past them.
pub struct BPlusTree {
    index_name: String,
    root_page_id: Mutex<PageId>,
    comparator: Arc<dyn KeyComparator>,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    bpm: Arc<BufferPoolManager>,
}

impl BPlusTree {
    /// Opens the named index, registering it in the header page if it does
    /// not exist yet.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = index_name.into();
        assert!(
            (2..=leaf_capacity(key_size)).contains(&leaf_max_size),
            "leaf_max_size out of range for this key width"
        );
        assert!(
            (3..=internal_capacity(key_size)).contains(&internal_max_size),
            "internal_max_size out of range for this key width"
        );

        let root_page_id = {
            let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
            let mut header = HeaderPage::new(guard.data_mut());
            match header.get_root_id(&index_name)? {
                Some(root) => root,
                None => {
                    header.insert_record(&index_name, INVALID_PAGE_ID)?;
                    INVALID_PAGE_ID
                }
            }
        };

        Ok(Self {
            index_name,
            root_page_id: Mutex::new(root_page_id),
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
            bpm,
        })
    }

    /// Opens the named index with node sizes derived from the page layout.
    pub fn with_default_sizes(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
    ) -> Result<Self> {
        let leaf_max = leaf_capacity(key_size);
        let internal_max = internal_capacity(key_size);
        Self::new(index_name, bpm, comparator, key_size, leaf_max, internal_max)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.lock().is_valid()
    }

    /// Point lookup. Crabs read latches down to the target leaf.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RecordId>> {
        debug_assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let mut guard = {
            let root = self.root_page_id.lock();
            if !root.is_valid() {
                return Ok(None);
            }
            self.bpm.fetch_page_read(*root)?
        };

        loop {
            let next = {
                let data = guard.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        let leaf = LeafNodeRef::new(data, self.key_size);
                        return Ok(leaf.find(key, cmp).map(|i| leaf.rid_at(i)));
                    }
                    BTreePageType::Internal => {
                        let node = InternalNodeRef::new(data, self.key_size);
                        node.child_at(node.lookup_child(key, cmp))
                    }
                    BTreePageType::Invalid => {
                        return Err(DbError::PageCorrupted(format!(
                            "page {} is not a tree node",
                            guard.page_id()
                        )))
                    }
                }
            };
            // Latch the child before the parent guard is dropped.
            guard = self.bpm.fetch_page_read(next)?;
        }
    }

    /// Inserts `(key, rid)`. Returns false when the key already exists.
    pub fn insert(&self, key: &[u8], rid: RecordId) -> Result<bool> {
        debug_assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let mut ctx = LatchContext {
            root_guard: Some(self.root_page_id.lock()),
            write_set: Vec::new(),
            deleted: Vec::new(),
        };

        let root_id = **ctx.root_guard.as_ref().unwrap();
        if !root_id.is_valid() {
            self.start_new_tree(key, rid, &mut ctx)?;
            self.finish(ctx);
            return Ok(true);
        }

        self.descend_for_write(&mut ctx, root_id, key, WriteOp::Insert)?;

        let (duplicate, overflow) = {
            let leaf_guard = ctx.write_set.last_mut().unwrap();
            let mut leaf = LeafNode::new(leaf_guard.data_mut(), self.key_size);
            let pos = leaf.lower_bound(key, cmp);
            if pos < leaf.size() && cmp.compare(leaf.key_at(pos), key) == Ordering::Equal {
                (true, false)
            } else {
                leaf.insert_at(pos, key, rid);
                (false, leaf.size() > self.leaf_max_size)
            }
        };

        if duplicate {
            self.finish(ctx);
            return Ok(false);
        }
        if overflow {
            self.split_cascade(&mut ctx)?;
        }
        self.finish(ctx);
        Ok(true)
    }

    /// Removes `key`. Returns false when the key is absent.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        debug_assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let mut ctx = LatchContext {
            root_guard: Some(self.root_page_id.lock()),
            write_set: Vec::new(),
            deleted: Vec::new(),
        };

        let root_id = **ctx.root_guard.as_ref().unwrap();
        if !root_id.is_valid() {
            self.finish(ctx);
            return Ok(false);
        }

        self.descend_for_write(&mut ctx, root_id, key, WriteOp::Delete)?;

        let (found, leaf_size, leaf_id) = {
            let leaf_guard = ctx.write_set.last_mut().unwrap();
            let leaf_id = leaf_guard.page_id();
            let mut leaf = LeafNode::new(leaf_guard.data_mut(), self.key_size);
            match leaf.find(key, cmp) {
                Some(pos) => {
                    leaf.remove_at(pos);
                    (true, leaf.size(), leaf_id)
                }
                None => (false, leaf.size(), leaf_id),
            }
        };

        if !found {
            self.finish(ctx);
            return Ok(false);
        }

        let leaf_is_root = ctx.write_set.len() == 1 && ctx.root_guard.is_some();
        if leaf_is_root {
            if leaf_size == 0 {
                ctx.deleted.push(leaf_id);
                self.set_root(&mut ctx, INVALID_PAGE_ID)?;
            }
        } else if leaf_size < self.min_leaf_size() && ctx.write_set.len() > 1 {
            let level = ctx.write_set.len() - 1;
            self.coalesce_or_redistribute(&mut ctx, level, true)?;
        }

        self.finish(ctx);
        Ok(true)
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<BTreeIterator> {
        let guard = {
            let root = self.root_page_id.lock();
            if !root.is_valid() {
                return Ok(BTreeIterator::end(Arc::clone(&self.bpm), self.key_size));
            }
            self.bpm.fetch_page_read(*root)?
        };

        let mut guard = guard;
        loop {
            let next = {
                let data = guard.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        return Ok(BTreeIterator::at(
                            Arc::clone(&self.bpm),
                            self.key_size,
                            guard,
                            0,
                        ));
                    }
                    BTreePageType::Internal => {
                        InternalNodeRef::new(data, self.key_size).child_at(0)
                    }
                    BTreePageType::Invalid => {
                        return Err(DbError::PageCorrupted(format!(
                            "page {} is not a tree node",
                            guard.page_id()
                        )))
                    }
                }
            };
            guard = self.bpm.fetch_page_read(next)?;
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BTreeIterator> {
        debug_assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let guard = {
            let root = self.root_page_id.lock();
            if !root.is_valid() {
                return Ok(BTreeIterator::end(Arc::clone(&self.bpm), self.key_size));
            }
            self.bpm.fetch_page_read(*root)?
        };

        let mut guard = guard;
        loop {
            let step = {
                let data = guard.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        let leaf = LeafNodeRef::new(data, self.key_size);
                        let pos = leaf.lower_bound(key, cmp);
                        let next_leaf = leaf.next_page_id();
                        if pos < leaf.size() {
                            DescentStep::Position(pos)
                        } else {
                            DescentStep::NextLeaf(next_leaf)
                        }
                    }
                    BTreePageType::Internal => {
                        let node = InternalNodeRef::new(data, self.key_size);
                        DescentStep::Child(node.child_at(node.lookup_child(key, cmp)))
                    }
                    BTreePageType::Invalid => {
                        return Err(DbError::PageCorrupted(format!(
                            "page {} is not a tree node",
                            guard.page_id()
                        )))
                    }
                }
            };
            match step {
                DescentStep::Position(pos) => {
                    return Ok(BTreeIterator::at(
                        Arc::clone(&self.bpm),
                        self.key_size,
                        guard,
                        pos,
                    ));
                }
                DescentStep::NextLeaf(next) => {
                    // All keys in this leaf are smaller; continue in the
                    // sibling (releasing the current leaf first).
                    drop(guard);
                    if !next.is_valid() {
                        return Ok(BTreeIterator::end(Arc::clone(&self.bpm), self.key_size));
                    }
                    guard = self.bpm.fetch_page_read(next)?;
                }
                DescentStep::Child(child) => {
                    guard = self.bpm.fetch_page_read(child)?;
                }
            }
        }
    }

    fn min_leaf_size(&self) -> usize {
        (self.leaf_max_size + 1) / 2
    }

    fn min_internal_size(&self) -> usize {
        (self.internal_max_size + 1) / 2
    }

    /// Write-latching descent. Ancestors (including the root latch) are
    /// released as soon as the newly latched child is safe for `op`.
    fn descend_for_write(
        &self,
        ctx: &mut LatchContext<'_>,
        root_id: PageId,
        key: &[u8],
        op: WriteOp,
    ) -> Result<()> {
        let cmp = &*self.comparator;
        let mut pid = root_id;
        let mut at_root = true;

        loop {
            let guard = self.bpm.fetch_page_write(pid)?;
            let (is_leaf, safe, next) = {
                let data = guard.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        let size = node_size(data);
                        (true, op.leaf_is_safe(size, at_root, self.min_leaf_size(), self.leaf_max_size), INVALID_PAGE_ID)
                    }
                    BTreePageType::Internal => {
                        let node = InternalNodeRef::new(data, self.key_size);
                        let safe = op.internal_is_safe(
                            node.size(),
                            at_root,
                            self.min_internal_size(),
                            self.internal_max_size,
                        );
                        (false, safe, node.child_at(node.lookup_child(key, cmp)))
                    }
                    BTreePageType::Invalid => {
                        return Err(DbError::PageCorrupted(format!(
                            "page {} is not a tree node",
                            pid
                        )))
                    }
                }
            };

            if safe {
                ctx.release_ancestors();
            }
            ctx.write_set.push(guard);

            if is_leaf {
                return Ok(());
            }
            pid = next;
            at_root = false;
        }
    }

    /// Installs a single-leaf root for the first insertion into an empty
    /// tree. The root latch in `ctx` must be held.
    fn start_new_tree(&self, key: &[u8], rid: RecordId, ctx: &mut LatchContext<'_>) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();
        let mut leaf = LeafNode::new(guard.data_mut(), self.key_size);
        leaf.init(root_id, self.leaf_max_size);
        leaf.insert_at(0, key, rid);
        drop(guard);

        debug!("{}: new root leaf {}", self.index_name, root_id);
        self.set_root(ctx, root_id)
    }

    /// Updates the cached root page id and mirrors it to the header page.
    fn set_root(&self, ctx: &mut LatchContext<'_>, new_root: PageId) -> Result<()> {
        match ctx.root_guard.as_deref_mut() {
            Some(root) => *root = new_root,
            None => {
                return Err(DbError::PageCorrupted(
                    "root changed without holding the root latch".into(),
                ))
            }
        }

        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if !header.update_record(&self.index_name, new_root)? {
            header.insert_record(&self.index_name, new_root)?;
        }
        Ok(())
    }

    /// Rewrites the parent pointer of children moved between nodes at
    /// `held_level`'s tier. A child the descent path already holds
    /// write-latched in the page-set must be updated through that guard;
    /// latching it a second time would self-deadlock.
    fn reparent_children(
        &self,
        ctx: &mut LatchContext<'_>,
        held_level: usize,
        children: Vec<PageId>,
        new_parent: PageId,
    ) -> Result<()> {
        for child in children {
            if held_level < ctx.write_set.len() && ctx.write_set[held_level].page_id() == child {
                set_parent(ctx.write_set[held_level].data_mut(), new_parent);
            } else {
                let mut child_guard = self.bpm.fetch_page_write(child)?;
                set_parent(child_guard.data_mut(), new_parent);
            }
        }
        Ok(())
    }

    /// Drops every latch in acquisition order, then deletes the pages the
    /// operation emptied.
    fn finish(&self, mut ctx: LatchContext<'_>) {
        ctx.write_set.clear();
        ctx.root_guard = None;
        for pid in ctx.deleted.drain(..) {
            if let Err(e) = self.bpm.delete_page(pid) {
                warn!("{}: could not delete page {}: {}", self.index_name, pid, e);
            }
        }
    }

    /// Splits the overflowing leaf at the bottom of the write set and
    /// propagates separators upward while parents overflow in turn.
    fn split_cascade(&self, ctx: &mut LatchContext<'_>) -> Result<()> {
        let ks = self.key_size;
        let mut level = ctx.write_set.len() - 1;
        let mut at_leaf = true;

        loop {
            let node_id = ctx.write_set[level].page_id();
            let mut new_guard = self.bpm.new_page()?;
            let new_id = new_guard.page_id();

            let separator;
            if at_leaf {
                let node_guard = &mut ctx.write_set[level];
                let mut node = LeafNode::new(node_guard.data_mut(), ks);
                let mut new_node = LeafNode::new(new_guard.data_mut(), ks);
                new_node.init(new_id, self.leaf_max_size);

                node.move_upper_half_to(&mut new_node);
                new_node.set_next_page_id(node.next_page_id());
                node.set_next_page_id(new_id);
                new_node.set_parent_page_id(node.parent_page_id());
                separator = new_node.key_at(0).to_vec();
            } else {
                let moved_children = {
                    let node_guard = &mut ctx.write_set[level];
                    let mut node = InternalNode::new(node_guard.data_mut(), ks);
                    let mut new_node = InternalNode::new(new_guard.data_mut(), ks);
                    new_node.init(new_id, self.internal_max_size);

                    separator = node.move_upper_half_to(&mut new_node);
                    new_node.set_parent_page_id(node.parent_page_id());
                    (0..new_node.size())
                        .map(|i| new_node.child_at(i))
                        .collect::<Vec<_>>()
                };
                self.reparent_children(ctx, level + 1, moved_children, new_id)?;
            }
            debug!(
                "{}: split node {} into {} (separator level {})",
                self.index_name, node_id, new_id, level
            );

            if level == 0 {
                // The split reached the held root; grow the tree by one
                // level.
                let mut root_guard = self.bpm.new_page()?;
                let root_id = root_guard.page_id();
                let mut root = InternalNode::new(root_guard.data_mut(), ks);
                root.init(root_id, self.internal_max_size);
                root.populate_new_root(node_id, &separator, new_id);
                drop(root_guard);

                set_parent(ctx.write_set[level].data_mut(), root_id);
                set_parent(new_guard.data_mut(), root_id);
                drop(new_guard);

                self.set_root(ctx, root_id)?;
                return Ok(());
            }

            let overflow = {
                let parent_guard = &mut ctx.write_set[level - 1];
                let mut parent = InternalNode::new(parent_guard.data_mut(), ks);
                let idx = parent.child_index_of(node_id).ok_or_else(|| {
                    DbError::PageCorrupted("split node missing from its parent".into())
                })?;
                parent.insert_at(idx + 1, &separator, new_id);
                parent.size() > self.internal_max_size
            };
            drop(new_guard);

            if !overflow {
                return Ok(());
            }
            level -= 1;
            at_leaf = false;
        }
    }

    /// Fixes the under-full node at `level` of the write set: borrows one
    /// entry from a sibling when the pair holds more than one node's worth
    /// of entries, merges with it otherwise. Recurses when the merge
    /// under-fills the parent; adjusts the root when the recursion reaches
    /// it.
    fn coalesce_or_redistribute(
        &self,
        ctx: &mut LatchContext<'_>,
        level: usize,
        at_leaf: bool,
    ) -> Result<()> {
        debug_assert!(level > 0);
        let ks = self.key_size;
        let node_id = ctx.write_set[level].page_id();

        let (node_index, sibling_index, sibling_id) = {
            let parent_guard = &mut ctx.write_set[level - 1];
            let parent = InternalNodeRef::new(parent_guard.data(), ks);
            let node_index = parent.child_index_of(node_id).ok_or_else(|| {
                DbError::PageCorrupted("under-full node missing from its parent".into())
            })?;
            let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
            (node_index, sibling_index, parent.child_at(sibling_index))
        };

        let mut sibling_guard = self.bpm.fetch_page_write(sibling_id)?;

        // The surviving (left) page of a merge and the children whose
        // parent pointer must be rewritten afterwards.
        let mut reparent: Vec<PageId> = Vec::new();
        let mut reparent_to = INVALID_PAGE_ID;
        let mut merged = false;

        {
            let (head, tail) = ctx.write_set.split_at_mut(level);
            let parent_guard = head.last_mut().unwrap();
            let node_guard = &mut tail[0];
            let mut parent = InternalNode::new(parent_guard.data_mut(), ks);

            if at_leaf {
                let mut node = LeafNode::new(node_guard.data_mut(), ks);
                let mut sibling = LeafNode::new(sibling_guard.data_mut(), ks);

                if node.size() + sibling.size() > self.leaf_max_size {
                    // Redistribute exactly one entry from the fuller
                    // sibling into the under-full node.
                    if sibling_index < node_index {
                        let last = sibling.size() - 1;
                        let moved_key = sibling.key_at(last).to_vec();
                        let moved_rid = sibling.rid_at(last);
                        sibling.remove_at(last);
                        node.insert_at(0, &moved_key, moved_rid);
                        parent.set_key_at(node_index, &moved_key);
                    } else {
                        let moved_key = sibling.key_at(0).to_vec();
                        let moved_rid = sibling.rid_at(0);
                        sibling.remove_at(0);
                        let end = node.size();
                        node.insert_at(end, &moved_key, moved_rid);
                        let new_sep = sibling.key_at(0).to_vec();
                        parent.set_key_at(sibling_index, &new_sep);
                    }
                } else if sibling_index < node_index {
                    sibling.absorb_right(&mut node);
                    parent.remove_at(node_index);
                    ctx.deleted.push(node_id);
                    merged = true;
                } else {
                    node.absorb_right(&mut sibling);
                    parent.remove_at(sibling_index);
                    ctx.deleted.push(sibling_id);
                    merged = true;
                }
            } else {
                let mut node = InternalNode::new(node_guard.data_mut(), ks);
                let mut sibling = InternalNode::new(sibling_guard.data_mut(), ks);

                if node.size() + sibling.size() > self.internal_max_size {
                    if sibling_index < node_index {
                        // The left sibling's last child moves to the front
                        // of the node; the parent separator rotates down
                        // and the sibling's last key rotates up.
                        let last = sibling.size() - 1;
                        let moved_child = sibling.child_at(last);
                        let moved_key = sibling.key_at(last).to_vec();
                        let old_sep = parent.key_at(node_index).to_vec();
                        sibling.remove_at(last);
                        node.insert_at(0, &old_sep, moved_child);
                        node.set_key_at(1, &old_sep);
                        parent.set_key_at(node_index, &moved_key);
                        reparent.push(moved_child);
                    } else {
                        let moved_child = sibling.child_at(0);
                        let old_sep = parent.key_at(sibling_index).to_vec();
                        let new_sep = sibling.key_at(1).to_vec();
                        sibling.remove_at(0);
                        let end = node.size();
                        node.insert_at(end, &old_sep, moved_child);
                        parent.set_key_at(sibling_index, &new_sep);
                        reparent.push(moved_child);
                    }
                    reparent_to = node_id;
                } else if sibling_index < node_index {
                    let sep = parent.key_at(node_index).to_vec();
                    reparent = (0..node.size()).map(|i| node.child_at(i)).collect();
                    reparent_to = sibling_id;
                    sibling.absorb_right(&sep, &mut node);
                    parent.remove_at(node_index);
                    ctx.deleted.push(node_id);
                    merged = true;
                } else {
                    let sep = parent.key_at(sibling_index).to_vec();
                    reparent = (0..sibling.size()).map(|i| sibling.child_at(i)).collect();
                    reparent_to = node_id;
                    node.absorb_right(&sep, &mut sibling);
                    parent.remove_at(sibling_index);
                    ctx.deleted.push(sibling_id);
                    merged = true;
                }
            }
        }

        self.reparent_children(ctx, level + 1, reparent, reparent_to)?;

        if !merged {
            return Ok(());
        }
        debug!(
            "{}: coalesced around node {} at level {}",
            self.index_name, node_id, level
        );

        let parent_level = level - 1;
        let (parent_size, parent_id) = {
            let guard = &ctx.write_set[parent_level];
            (node_size(guard.data()), guard.page_id())
        };

        if parent_level == 0 && ctx.root_guard.is_some() {
            if parent_size == 1 {
                // The root has a single child left; promote it.
                let only_child = {
                    let guard = &ctx.write_set[0];
                    InternalNodeRef::new(guard.data(), ks).child_at(0)
                };
                let survivor_is_node = only_child == node_id;
                if survivor_is_node {
                    set_parent(ctx.write_set[level].data_mut(), INVALID_PAGE_ID);
                } else if only_child == sibling_id {
                    set_parent(sibling_guard.data_mut(), INVALID_PAGE_ID);
                } else {
                    let mut child_guard = self.bpm.fetch_page_write(only_child)?;
                    set_parent(child_guard.data_mut(), INVALID_PAGE_ID);
                }
                ctx.deleted.push(parent_id);
                self.set_root(ctx, only_child)?;
                debug!("{}: root collapsed to {}", self.index_name, only_child);
            }
            return Ok(());
        }

        drop(sibling_guard);
        if parent_level > 0 && parent_size < self.min_internal_size() {
            return self.coalesce_or_redistribute(ctx, parent_level, false);
        }
        Ok(())
    }

    /// Walks the whole tree asserting the structural invariants: node
    /// sizes within bounds (root exempt), strictly increasing keys, parent
    /// pointers consistent, each internal slot key equal to the smallest
    /// key of its subtree, uniform depth, and an ascending leaf chain that
    /// covers every key exactly once.
    pub fn check_integrity(&self) -> Result<()> {
        let root_id = *self.root_page_id.lock();
        if !root_id.is_valid() {
            return Ok(());
        }

        let summary = self.check_node(root_id, INVALID_PAGE_ID, true)?;

        // Walk the sibling chain from the leftmost leaf.
        let mut iter = self.begin()?;
        let mut count = 0usize;
        let mut prev: Option<Vec<u8>> = None;
        while let Some((key, _rid)) = iter.next()? {
            if let Some(ref p) = prev {
                if self.comparator.compare(p, &key) != Ordering::Less {
                    return Err(DbError::PageCorrupted(
                        "leaf chain keys are not strictly increasing".into(),
                    ));
                }
            }
            prev = Some(key);
            count += 1;
        }
        if count != summary.num_keys {
            return Err(DbError::PageCorrupted(format!(
                "leaf chain visits {} keys but the tree holds {}",
                count, summary.num_keys
            )));
        }
        Ok(())
    }

    fn check_node(&self, pid: PageId, expected_parent: PageId, is_root: bool) -> Result<NodeSummary> {
        let cmp = &*self.comparator;
        let guard = self.bpm.fetch_page_read(pid)?;
        let data = guard.data();

        if parent_of(data) != expected_parent {
            return Err(DbError::PageCorrupted(format!(
                "page {} has parent {} but is reached from {}",
                pid,
                parent_of(data),
                expected_parent
            )));
        }

        match page_type(data) {
            BTreePageType::Leaf => {
                let leaf = LeafNodeRef::new(data, self.key_size);
                let size = leaf.size();
                if !is_root && (size < leaf.min_size() || size > leaf.max_size()) {
                    return Err(DbError::PageCorrupted(format!(
                        "leaf {} has size {} outside [{}, {}]",
                        pid,
                        size,
                        leaf.min_size(),
                        leaf.max_size()
                    )));
                }
                if size == 0 {
                    return Err(DbError::PageCorrupted(format!("leaf {} is empty", pid)));
                }
                for i in 1..size {
                    if cmp.compare(leaf.key_at(i - 1), leaf.key_at(i)) != Ordering::Less {
                        return Err(DbError::PageCorrupted(format!(
                            "leaf {} keys are not strictly increasing",
                            pid
                        )));
                    }
                }
                Ok(NodeSummary {
                    min_key: leaf.key_at(0).to_vec(),
                    max_key: leaf.key_at(size - 1).to_vec(),
                    height: 0,
                    num_keys: size,
                })
            }
            BTreePageType::Internal => {
                let node = InternalNodeRef::new(data, self.key_size);
                let size = node.size();
                if !is_root && (size < node.min_size() || size > node.max_size()) {
                    return Err(DbError::PageCorrupted(format!(
                        "internal {} has size {} outside [{}, {}]",
                        pid,
                        size,
                        node.min_size(),
                        node.max_size()
                    )));
                }
                if size < 2 {
                    return Err(DbError::PageCorrupted(format!(
                        "internal {} has fewer than two children",
                        pid
                    )));
                }
                for i in 2..size {
                    if cmp.compare(node.key_at(i - 1), node.key_at(i)) != Ordering::Less {
                        return Err(DbError::PageCorrupted(format!(
                            "internal {} keys are not strictly increasing",
                            pid
                        )));
                    }
                }

                // Each slot key must bound its subtrees: greater than
                // everything left of it, and at most the minimum to its
                // right. Deletions may leave a separator below the exact
                // subtree minimum, so this is a bound, not an equality.
                let mut height = None;
                let mut num_keys = 0;
                let mut min_key = None;
                let mut max_key: Option<Vec<u8>> = None;
                for i in 0..size {
                    let child = self.check_node(node.child_at(i), pid, false)?;
                    if i == 0 {
                        min_key = Some(child.min_key.clone());
                    } else {
                        if cmp.compare(node.key_at(i), &child.min_key) == Ordering::Greater {
                            return Err(DbError::PageCorrupted(format!(
                                "internal {} slot {} key exceeds its subtree minimum",
                                pid, i
                            )));
                        }
                        if let Some(ref prev_max) = max_key {
                            if cmp.compare(prev_max, node.key_at(i)) != Ordering::Less {
                                return Err(DbError::PageCorrupted(format!(
                                    "internal {} slot {} key does not bound its left subtree",
                                    pid, i
                                )));
                            }
                        }
                    }
                    match height {
                        None => height = Some(child.height),
                        Some(h) if h != child.height => {
                            return Err(DbError::PageCorrupted(format!(
                                "internal {} has children of unequal height",
                                pid
                            )))
                        }
                        _ => {}
                    }
                    num_keys += child.num_keys;
                    max_key = Some(child.max_key);
                }

                Ok(NodeSummary {
                    min_key: min_key.unwrap(),
                    max_key: max_key.unwrap(),
                    height: height.unwrap() + 1,
                    num_keys,
                })
            }
            BTreePageType::Invalid => Err(DbError::PageCorrupted(format!(
                "page {} is not a tree node",
                pid
            ))),
        }
    }
}

struct NodeSummary {
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    height: usize,
    num_keys: usize,
}

enum DescentStep {
    Position(usize),
    NextLeaf(PageId),
    Child(PageId),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Delete,
}

impl WriteOp {
    /// A node is safe when the mutation provably cannot propagate past it.
    fn leaf_is_safe(self, size: usize, is_root: bool, min_size: usize, max_size: usize) -> bool {
        match self {
            WriteOp::Insert => size < max_size,
            WriteOp::Delete => {
                if is_root {
                    size > 1
                } else {
                    size > min_size
                }
            }
        }
    }

    fn internal_is_safe(self, size: usize, is_root: bool, min_size: usize, max_size: usize) -> bool {
        match self {
            WriteOp::Insert => size < max_size,
            WriteOp::Delete => {
                if is_root {
                    size > 2
                } else {
                    size > min_size
                }
            }
        }
    }
}
