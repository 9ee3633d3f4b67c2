//! Raw data fragments ("buckets") as delivered by the archive
//!
//! A fragment carries one source's values over one time axis. The transport
//! layer decodes wire messages into `RawFragment`s; the pipeline only sees
//! their logical fields.

use crate::clock::{SamplingClock, TimeAxis};
use crate::error::{Error, Result};
use crate::types::{Value, ValueType};

/// One source's values over one sampling clock or timestamp list
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    /// Data source name
    pub source: String,
    /// Declared value type of every non-null value
    pub value_type: ValueType,
    /// Ordered values, one per sample instant
    pub values: Vec<Value>,
    /// Sample instants
    pub axis: TimeAxis,
    /// Size of the encoded message this fragment came from
    pub serialized_size: usize,
}

impl RawFragment {
    /// Create a fragment sampled by a uniform clock
    pub fn with_clock(
        source: impl Into<String>,
        value_type: ValueType,
        values: Vec<Value>,
        clock: SamplingClock,
    ) -> Self {
        let values_len = values.len();
        Self {
            source: source.into(),
            value_type,
            values,
            axis: TimeAxis::Clock(clock),
            serialized_size: values_len * value_type.value_size(),
        }
    }

    /// Create a fragment with explicit timestamps
    pub fn with_timestamps(
        source: impl Into<String>,
        value_type: ValueType,
        values: Vec<Value>,
        axis: TimeAxis,
    ) -> Self {
        let values_len = values.len();
        Self {
            source: source.into(),
            value_type,
            values,
            axis,
            serialized_size: values_len * (value_type.value_size() + 8),
        }
    }

    /// Override the encoded size reported by the transport
    pub fn with_serialized_size(mut self, size: usize) -> Self {
        self.serialized_size = size;
        self
    }

    /// Number of values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the fragment carries no values
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the fragment before it is allowed near a block
    ///
    /// Rejects empty names and value lists, unsupported tags, value/axis
    /// length mismatches, invalid axes and values that do not match the
    /// declared tag.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(Error::malformed("", "empty source name"));
        }
        if !self.value_type.is_supported() {
            return Err(Error::UnsupportedType {
                source_name: self.source.clone(),
                value_type: self.value_type,
            });
        }
        if self.values.is_empty() {
            return Err(Error::malformed(&self.source, "empty value list"));
        }
        self.axis
            .validate()
            .map_err(|e| Error::malformed(&self.source, e.to_string()))?;

        let expected = self.axis.sample_count();
        if self.values.len() != expected {
            return Err(Error::malformed(
                &self.source,
                format!(
                    "{} values for {} sample instants",
                    self.values.len(),
                    expected
                ),
            ));
        }

        if let Some((index, value)) = self
            .values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.conforms_to(self.value_type))
        {
            return Err(Error::malformed(
                &self.source,
                format!(
                    "value {} at index {} does not match declared type {}",
                    value, index, self.value_type
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(count: usize) -> SamplingClock {
        SamplingClock::new(0, 1_000, count).unwrap()
    }

    #[test]
    fn test_valid_fragment() {
        let f = RawFragment::with_clock(
            "X",
            ValueType::Double,
            vec![Value::Double(1.0), Value::Null, Value::Double(3.0)],
            clock(3),
        );
        assert!(f.validate().is_ok());
        assert_eq!(f.len(), 3);
        assert_eq!(f.serialized_size, 24);
    }

    #[test]
    fn test_rejects_empty_values() {
        let f = RawFragment::with_clock("X", ValueType::Double, vec![], clock(1));
        let err = f.validate().unwrap_err();
        assert!(err.is_malformed_input());
        assert!(err.to_string().contains("X"));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let f = RawFragment::with_clock("X", ValueType::Long, vec![Value::Long(1)], clock(2));
        assert!(matches!(
            f.validate(),
            Err(Error::MalformedFragment { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let f = RawFragment::with_clock("IMG", ValueType::Image, vec![Value::Null], clock(1));
        assert!(matches!(
            f.validate(),
            Err(Error::UnsupportedType { value_type: ValueType::Image, .. })
        ));
    }

    #[test]
    fn test_rejects_value_tag_mismatch() {
        let f = RawFragment::with_clock(
            "X",
            ValueType::Int,
            vec![Value::Int(1), Value::String("two".into())],
            clock(2),
        );
        let err = f.validate().unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_rejects_bad_explicit_axis() {
        let f = RawFragment::with_timestamps(
            "X",
            ValueType::Bool,
            vec![Value::Bool(true), Value::Bool(false)],
            TimeAxis::Timestamps(vec![5, 5]),
        );
        assert!(f.validate().is_err());
    }
}
