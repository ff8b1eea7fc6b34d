use std::collections::HashMap;
use std::sync::Arc;

use super::DataType;

/// Shared schema handle used throughout the executor pipeline.
pub type SchemaRef = Arc<Schema>;

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Ordered column list describing a table or an executor's output.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
    /// Size of the null bitmap in bytes (one bit per column)
    null_bitmap_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let name_to_index = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.name.clone(), i))
            .collect();
        let null_bitmap_size = columns.len().div_ceil(8);

        Self {
            columns,
            name_to_index,
            null_bitmap_size,
        }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Schema consisting of the named column subset, in the given order.
    pub fn project(&self, column_indices: &[usize]) -> Option<Schema> {
        let columns: Option<Vec<Column>> = column_indices
            .iter()
            .map(|&i| self.columns.get(i).cloned())
            .collect();
        columns.map(Schema::new)
    }

    /// Schema of a joined row: left columns followed by right columns.
    pub fn join(left: &Schema, right: &Schema) -> Schema {
        let columns = left
            .columns()
            .chain(right.columns())
            .cloned()
            .collect::<Vec<_>>();
        Schema::new(columns)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

/// Fluent schema construction.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, false));
        self
    }

    pub fn nullable_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, true));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    pub fn build_arc(self) -> SchemaRef {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
