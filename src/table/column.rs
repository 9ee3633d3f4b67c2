//! Typed value columns

use crate::error::{Error, Result};
use crate::fragment::RawFragment;
use crate::types::{Value, ValueType};

/// A run of values sharing one declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Declared type of every non-null value
    pub value_type: ValueType,
    /// Values, `Value::Null` where a sample is missing
    pub values: Vec<Value>,
}

impl Column {
    /// Create a column, rejecting unsupported types and mistyped values
    pub fn new(source: &str, value_type: ValueType, values: Vec<Value>) -> Result<Self> {
        if !value_type.is_supported() {
            return Err(Error::UnsupportedType {
                source_name: source.to_string(),
                value_type,
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.conforms_to(value_type)) {
            return Err(Error::malformed(
                source,
                format!("value {} does not match column type {}", bad, value_type),
            ));
        }
        Ok(Self { value_type, values })
    }

    /// All-null column of the given length
    pub fn nulls(value_type: ValueType, len: usize) -> Self {
        Self {
            value_type,
            values: vec![Value::Null; len],
        }
    }

    /// Take ownership of a validated fragment's values
    pub fn from_fragment(fragment: RawFragment) -> Result<Self> {
        Self::new(&fragment.source, fragment.value_type, fragment.values)
    }

    /// Number of values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the column holds no values
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of null entries
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Approximate memory footprint in bytes
    pub fn memory_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<Value>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_checks() {
        assert!(Column::new("X", ValueType::Long, vec![Value::Long(1), Value::Null]).is_ok());
        assert!(Column::new("X", ValueType::Long, vec![Value::Double(1.0)]).is_err());
        assert!(matches!(
            Column::new("X", ValueType::Structure, vec![]),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_null_column() {
        let col = Column::nulls(ValueType::String, 4);
        assert_eq!(col.len(), 4);
        assert_eq!(col.null_count(), 4);
    }
}
