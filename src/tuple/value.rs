use std::cmp::Ordering;
use std::fmt;

use super::DataType;

/// A typed value held by a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Serializes the value for the given column type. Integer values may
    /// widen to BigInt/Double. Returns None for incompatible combinations
    /// or strings that exceed the declared length.
    pub fn serialize(&self, data_type: &DataType) -> Option<Vec<u8>> {
        match (self, data_type) {
            // Null payloads are elided; the null bitmap records them.
            (Value::Null, _) => Some(Vec::new()),

            (Value::Boolean(b), DataType::Boolean) => Some(vec![u8::from(*b)]),
            (Value::Integer(v), DataType::Integer) => Some(v.to_le_bytes().to_vec()),
            (Value::BigInt(v), DataType::BigInt) => Some(v.to_le_bytes().to_vec()),
            (Value::Double(v), DataType::Double) => Some(v.to_le_bytes().to_vec()),

            (Value::String(s), DataType::Char(n)) => {
                let n = *n as usize;
                if s.len() > n {
                    return None;
                }
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(n, b' ');
                Some(bytes)
            }

            (Value::String(s), DataType::VarChar(max_len)) => {
                if s.len() > *max_len as usize {
                    return None;
                }
                let mut bytes = (s.len() as u16).to_le_bytes().to_vec();
                bytes.extend_from_slice(s.as_bytes());
                Some(bytes)
            }

            // Widening
            (Value::Integer(v), DataType::BigInt) => Some((*v as i64).to_le_bytes().to_vec()),
            (Value::Integer(v), DataType::Double) => Some((*v as f64).to_le_bytes().to_vec()),
            (Value::BigInt(v), DataType::Double) => Some((*v as f64).to_le_bytes().to_vec()),

            _ => None,
        }
    }

    /// Deserializes a value of the given type, returning it and the number
    /// of bytes consumed.
    pub fn deserialize(data: &[u8], data_type: &DataType) -> Option<(Self, usize)> {
        match data_type {
            DataType::Boolean => {
                let b = *data.first()?;
                Some((Value::Boolean(b != 0), 1))
            }
            DataType::Integer => {
                let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
                Some((Value::Integer(i32::from_le_bytes(bytes)), 4))
            }
            DataType::BigInt => {
                let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
                Some((Value::BigInt(i64::from_le_bytes(bytes)), 8))
            }
            DataType::Double => {
                let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
                Some((Value::Double(f64::from_le_bytes(bytes)), 8))
            }
            DataType::Char(n) => {
                let n = *n as usize;
                let raw = data.get(..n)?;
                let s = String::from_utf8_lossy(raw).trim_end().to_string();
                Some((Value::String(s), n))
            }
            DataType::VarChar(_) => {
                let len_bytes: [u8; 2] = data.get(..2)?.try_into().ok()?;
                let len = u16::from_le_bytes(len_bytes) as usize;
                let raw = data.get(2..2 + len)?;
                let s = String::from_utf8_lossy(raw).to_string();
                Some((Value::String(s), 2 + len))
            }
        }
    }

    /// Compares two values. Returns None when they are incomparable
    /// (nulls, or mismatched non-numeric types).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,

            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),

            (Value::Integer(a), Value::BigInt(b)) => Some((*a as i64).cmp(b)),
            (Value::BigInt(a), Value::Integer(b)) => Some(a.cmp(&(*b as i64))),
            (Value::Integer(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::BigInt(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::BigInt(b)) => a.partial_cmp(&(*b as f64)),

            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
