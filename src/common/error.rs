use thiserror::Error;

use super::types::{PageId, SlotId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool exhausted: no free or evictable frame")]
    PoolExhausted,

    #[error("Page {0} is still pinned")]
    PagePinned(PageId),

    #[error("Disk scheduler error: {0}")]
    Scheduler(String),

    #[error("Tuple of {tuple_size} bytes does not fit ({available} bytes available)")]
    TupleTooLarge { tuple_size: usize, available: usize },

    #[error("Invalid slot: {0}")]
    InvalidSlot(SlotId),

    #[error("Header page is full")]
    HeaderFull,

    #[error("Index name too long: {0}")]
    IndexNameTooLong(String),

    #[error("Tuple serialization failed: {0}")]
    Serialization(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Column {0} cannot be used in an index key")]
    InvalidKeyColumn(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Page corrupted: {0}")]
    PageCorrupted(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
