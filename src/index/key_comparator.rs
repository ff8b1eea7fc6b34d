use std::cmp::Ordering;

use crate::tuple::{DataType, Value};

/// Total order over serialized index keys. Keys are fixed-width byte
/// strings; the comparator knows how to interpret them.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Compares 4-byte little-endian signed integers.
pub struct IntegerComparator;

impl KeyComparator for IntegerComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() < 4 || b.len() < 4 {
            return a.len().cmp(&b.len());
        }

        let a_val = i32::from_le_bytes([a[0], a[1], a[2], a[3]]);
        let b_val = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);

        a_val.cmp(&b_val)
    }
}

/// Compares raw bytes lexicographically.
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Compares composite keys field-by-field according to a column type list.
/// Each field occupies its type's fixed width.
pub struct TypedKeyComparator {
    types: Vec<DataType>,
}

impl TypedKeyComparator {
    /// # Panics
    /// Panics if any type is variable-length; index keys are fixed-width.
    pub fn new(types: Vec<DataType>) -> Self {
        assert!(
            types.iter().all(|t| t.is_fixed_size()),
            "index key columns must be fixed-size"
        );
        Self { types }
    }

    pub fn key_size(&self) -> usize {
        self.types.iter().map(|t| t.fixed_size().unwrap()).sum()
    }
}

impl KeyComparator for TypedKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let mut offset = 0;
        for data_type in &self.types {
            let size = data_type.fixed_size().unwrap();
            let (lhs, rhs) = (&a[offset..offset + size], &b[offset..offset + size]);

            let left = Value::deserialize(lhs, data_type);
            let right = Value::deserialize(rhs, data_type);
            let ord = match (left, right) {
                (Some((lv, _)), Some((rv, _))) => {
                    lv.compare(&rv).unwrap_or(Ordering::Equal)
                }
                _ => lhs.cmp(rhs),
            };
            if ord != Ordering::Equal {
                return ord;
            }
            offset += size;
        }
        Ordering::Equal
    }
}
