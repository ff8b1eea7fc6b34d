use std::sync::Arc;

use super::{Schema, SchemaRef, Value};

/// A single row, carrying its schema and one value per column.
///
/// Serialized layout:
///
/// ```text
/// +-------------+------------------+----------------------+
/// | Null Bitmap | Fixed-Size Data  | Variable-Size Data   |
/// +-------------+------------------+----------------------+
/// ```
///
/// The bitmap holds one bit per column (1 = NULL). Fixed-size columns are
/// written in schema order (zeros for NULL, so later offsets stay put),
/// then variable-size columns in schema order (zero length for NULL).
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: SchemaRef,
    values: Vec<Value>,
}

impl Tuple {
    /// # Panics
    /// Panics if the value count does not match the schema.
    pub fn new(schema: SchemaRef, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "value count must match schema column count"
        );
        Self { schema, values }
    }

    pub fn from_bytes(schema: SchemaRef, data: &[u8]) -> Option<Self> {
        let values = Self::deserialize_values(&schema, data)?;
        Some(Self { schema, values })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let mut bytes = self.null_bitmap();

        for (i, col) in self.schema.columns().enumerate() {
            if !col.data_type().is_fixed_size() {
                continue;
            }
            let value = &self.values[i];
            if value.is_null() {
                bytes.extend(std::iter::repeat(0).take(col.data_type().fixed_size().unwrap()));
            } else {
                bytes.extend(value.serialize(col.data_type())?);
            }
        }

        for (i, col) in self.schema.columns().enumerate() {
            if col.data_type().is_fixed_size() {
                continue;
            }
            let value = &self.values[i];
            if value.is_null() {
                bytes.extend_from_slice(&0u16.to_le_bytes());
            } else {
                bytes.extend(value.serialize(col.data_type())?);
            }
        }

        Some(bytes)
    }

    /// Serializes the named columns as a fixed-width index key. All key
    /// columns must have fixed-size types.
    pub fn key_bytes(&self, key_attrs: &[usize]) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        for &attr in key_attrs {
            let col = self.schema.column(attr)?;
            let value = self.values.get(attr)?;
            col.data_type().fixed_size()?;
            if value.is_null() {
                return None;
            }
            bytes.extend(value.serialize(col.data_type())?);
        }
        Some(bytes)
    }

    /// Projects onto `out_schema`, taking the columns named by `indices`.
    pub fn project(&self, indices: &[usize], out_schema: &SchemaRef) -> Option<Tuple> {
        let values: Option<Vec<Value>> = indices
            .iter()
            .map(|&i| self.values.get(i).cloned())
            .collect();
        Some(Tuple::new(Arc::clone(out_schema), values?))
    }

    fn null_bitmap(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; self.schema.null_bitmap_size()];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bitmap
    }

    fn deserialize_values(schema: &Schema, data: &[u8]) -> Option<Vec<Value>> {
        let bitmap_size = schema.null_bitmap_size();
        let bitmap = data.get(..bitmap_size)?;
        let is_null = |i: usize| bitmap[i / 8] & (1 << (i % 8)) != 0;

        let mut values = vec![Value::Null; schema.column_count()];
        let mut offset = bitmap_size;

        for (i, col) in schema.columns().enumerate() {
            let Some(size) = col.data_type().fixed_size() else {
                continue;
            };
            if !is_null(i) {
                let (value, consumed) =
                    Value::deserialize(data.get(offset..)?, col.data_type())?;
                debug_assert_eq!(consumed, size);
                values[i] = value;
            }
            offset += size;
        }

        for (i, col) in schema.columns().enumerate() {
            if col.data_type().is_fixed_size() {
                continue;
            }
            let (value, consumed) = Value::deserialize(data.get(offset..)?, col.data_type())?;
            if !is_null(i) {
                values[i] = value;
            }
            offset += consumed;
        }

        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;

    fn test_schema() -> SchemaRef {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::VarChar(64))
            .nullable_column("score", DataType::Double)
            .build_arc()
    }

    #[test]
    fn test_tuple_roundtrip() {
        let schema = test_schema();
        let tuple = Tuple::new(
            Arc::clone(&schema),
            vec![
                Value::Integer(7),
                Value::String("alice".into()),
                Value::Double(3.5),
            ],
        );

        let bytes = tuple.to_bytes().unwrap();
        let recovered = Tuple::from_bytes(schema, &bytes).unwrap();

        assert_eq!(recovered.value(0), Some(&Value::Integer(7)));
        assert_eq!(recovered.value(1), Some(&Value::String("alice".into())));
        assert_eq!(recovered.value(2), Some(&Value::Double(3.5)));
    }

    #[test]
    fn test_tuple_null_roundtrip() {
        let schema = test_schema();
        let tuple = Tuple::new(
            Arc::clone(&schema),
            vec![Value::Integer(7), Value::String("bob".into()), Value::Null],
        );

        let bytes = tuple.to_bytes().unwrap();
        let recovered = Tuple::from_bytes(schema, &bytes).unwrap();

        assert_eq!(recovered.value(2), Some(&Value::Null));
        assert_eq!(recovered.value(1), Some(&Value::String("bob".into())));
    }

    #[test]
    fn test_value_by_name() {
        let schema = test_schema();
        let tuple = Tuple::new(
            schema,
            vec![Value::Integer(1), Value::String("x".into()), Value::Null],
        );
        assert_eq!(tuple.value_by_name("id"), Some(&Value::Integer(1)));
        assert_eq!(tuple.value_by_name("missing"), None);
    }

    #[test]
    fn test_key_bytes_fixed_width() {
        let schema = test_schema();
        let tuple = Tuple::new(
            schema,
            vec![
                Value::Integer(258),
                Value::String("x".into()),
                Value::Double(1.0),
            ],
        );

        let key = tuple.key_bytes(&[0]).unwrap();
        assert_eq!(key, 258i32.to_le_bytes().to_vec());

        // VarChar columns cannot form fixed-width keys.
        assert!(tuple.key_bytes(&[1]).is_none());
    }

    #[test]
    fn test_project() {
        let schema = test_schema();
        let tuple = Tuple::new(
            Arc::clone(&schema),
            vec![
                Value::Integer(5),
                Value::String("carol".into()),
                Value::Null,
            ],
        );

        let out_schema = Arc::new(schema.project(&[1]).unwrap());
        let projected = tuple.project(&[1], &out_schema).unwrap();
        assert_eq!(projected.values(), &[Value::String("carol".into())]);
    }
}
