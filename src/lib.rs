//! Bramble - an educational disk-oriented relational database engine
//!
//! The engine stores data in fixed-size pages on disk and caches them in a
//! buffer pool with pluggable replacement policies. Tables live in slotted
//! heap pages; indexes are persistent B+trees whose nodes are buffer-pool
//! pages, kept consistent under concurrency with latch crabbing. Queries
//! run through a pull-based (Volcano) executor pipeline.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): disk I/O and page organization
//!   - `DiskManager` / `DiskScheduler`: page file access behind a worker thread
//!   - `TablePage` / `TableHeap`: slotted tuple storage and the page chain
//!   - `HeaderPage`: the index-name to root-page directory on page 0
//! - **Buffer pool** (`buffer`): frame cache between disk and everything else
//!   - `BufferPoolManager` with `LruReplacer` / `ClockReplacer`
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pin-and-latch page access
//! - **Index** (`index`): `BPlusTree` with latch-crabbing concurrency,
//!   `BTreeIterator` for range scans
//! - **Catalog** (`catalog`): table and index registry
//! - **Execution** (`execution`): iterator-model operators (scans, joins,
//!   aggregation, data modification)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bramble::buffer::{BufferPoolManager, ReplacerPolicy};
//! use bramble::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("bramble.db").unwrap());
//! let bpm = BufferPoolManager::new(64, ReplacerPolicy::Lru, disk_manager);
//!
//! let mut guard = bpm.new_page().unwrap();
//! guard.data_mut()[..5].copy_from_slice(b"hello");
//! let page_id = guard.page_id();
//! drop(guard);
//!
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{DbError, FrameId, PageId, RecordId, Result, SlotId};
