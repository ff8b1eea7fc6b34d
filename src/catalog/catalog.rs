use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, Result};
use crate::index::{BPlusTree, TypedKeyComparator};
use crate::storage::TableHeap;
use crate::tuple::{DataType, SchemaRef, Tuple};

pub type TableOid = u32;
pub type IndexOid = u32;

/// Metadata and storage handle for one table.
pub struct TableInfo {
    pub name: String,
    pub oid: TableOid,
    pub schema: SchemaRef,
    pub heap: TableHeap,
}

/// Metadata and storage handle for one index.
pub struct IndexInfo {
    pub name: String,
    pub oid: IndexOid,
    pub table_name: String,
    /// Positions of the key columns in the table schema
    pub key_attrs: Vec<usize>,
    pub key_size: usize,
    pub index: BPlusTree,
}

impl IndexInfo {
    /// Serializes the key columns of a table tuple into this index's
    /// fixed-width key format.
    pub fn key_from_tuple(&self, tuple: &Tuple) -> Result<Vec<u8>> {
        tuple.key_bytes(&self.key_attrs).ok_or_else(|| {
            DbError::Serialization(format!("cannot build key for index {}", self.name))
        })
    }
}

/// In-memory registry of tables and indexes. Table OIDs and index OIDs are
/// assigned from one counter; lookups run under a reader/writer lock.
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<String, Arc<TableInfo>>>,
    tables_by_oid: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    indexes: RwLock<HashMap<String, Arc<IndexInfo>>>,
    indexes_by_table: RwLock<HashMap<String, Vec<Arc<IndexInfo>>>>,
    next_oid: AtomicU32,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            tables: RwLock::new(HashMap::new()),
            tables_by_oid: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            indexes_by_table: RwLock::new(HashMap::new()),
            next_oid: AtomicU32::new(0),
        }
    }

    pub fn create_table(&self, name: &str, schema: SchemaRef) -> Result<Arc<TableInfo>> {
        if self.tables.read().contains_key(name) {
            return Err(DbError::TableExists(name.to_string()));
        }

        let heap = TableHeap::new(Arc::clone(&self.bpm))?;
        let info = Arc::new(TableInfo {
            name: name.to_string(),
            oid: self.next_oid.fetch_add(1, Ordering::Relaxed),
            schema,
            heap,
        });

        self.tables
            .write()
            .insert(name.to_string(), Arc::clone(&info));
        self.tables_by_oid
            .write()
            .insert(info.oid, Arc::clone(&info));
        self.indexes_by_table
            .write()
            .insert(name.to_string(), Vec::new());
        Ok(info)
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableInfo>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_by_oid(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables_by_oid.read().get(&oid).cloned()
    }

    /// Creates a B+tree index over `key_attrs` of an existing table and
    /// backfills it from the rows already in the heap. Key columns must be
    /// fixed-size types.
    pub fn create_index(
        &self,
        index_name: &str,
        table_name: &str,
        key_attrs: Vec<usize>,
    ) -> Result<Arc<IndexInfo>> {
        if self.indexes.read().contains_key(index_name) {
            return Err(DbError::IndexExists(index_name.to_string()));
        }
        let table = self.table(table_name)?;

        let mut key_types: Vec<DataType> = Vec::with_capacity(key_attrs.len());
        for &attr in &key_attrs {
            let column = table
                .schema
                .column(attr)
                .ok_or_else(|| DbError::InvalidKeyColumn(format!("column {}", attr)))?;
            if !column.data_type().is_fixed_size() {
                return Err(DbError::InvalidKeyColumn(column.name().to_string()));
            }
            key_types.push(*column.data_type());
        }

        let comparator = TypedKeyComparator::new(key_types);
        let key_size = comparator.key_size();
        let index = BPlusTree::with_default_sizes(
            index_name,
            Arc::clone(&self.bpm),
            Arc::new(comparator),
            key_size,
        )?;

        let info = Arc::new(IndexInfo {
            name: index_name.to_string(),
            oid: self.next_oid.fetch_add(1, Ordering::Relaxed),
            table_name: table_name.to_string(),
            key_attrs,
            key_size,
            index,
        });

        // Backfill from existing rows.
        let mut iter = table.heap.iter(Arc::clone(&table.schema));
        while let Some((tuple, rid)) = iter.next()? {
            let key = info.key_from_tuple(&tuple)?;
            info.index.insert(&key, rid)?;
        }

        self.indexes
            .write()
            .insert(index_name.to_string(), Arc::clone(&info));
        self.indexes_by_table
            .write()
            .entry(table_name.to_string())
            .or_default()
            .push(Arc::clone(&info));
        Ok(info)
    }

    pub fn index(&self, name: &str) -> Result<Arc<IndexInfo>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))
    }

    /// Every index defined over the given table.
    pub fn table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        self.indexes_by_table
            .read()
            .get(table_name)
            .cloned()
            .unwrap_or_default()
    }
}
