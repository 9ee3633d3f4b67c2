//! Core data types used throughout the assembly pipeline
//!
//! # Key Types
//!
//! - **`Timestamp`**: nanoseconds since the Unix epoch (UTC)
//! - **`TimeRange`**: closed time interval used for block extents and collision tests
//! - **`ValueType`**: wire tag describing the values a fragment carries
//! - **`Value`**: a single dynamically typed sample
//!
//! # Example
//!
//! ```rust
//! use archive_assembly::types::{TimeRange, Value, ValueType};
//!
//! let range = TimeRange::new(1_000, 2_000).unwrap();
//! assert!(range.contains(1_500));
//! assert!(range.intersects(&TimeRange::new(2_000, 3_000).unwrap()));
//!
//! let v = Value::Double(42.5);
//! assert_eq!(v.value_type(), Some(ValueType::Double));
//! assert!(Value::Null.is_null());
//! ```

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Instant in nanoseconds since the Unix epoch
pub type Timestamp = i64;

/// Nanoseconds per second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Render a timestamp as RFC 3339 text (UTC)
pub fn format_timestamp<T: Borrow<Timestamp>>(ts: T) -> String {
    DateTime::from_timestamp_nanos(*ts.borrow()).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Closed time interval `[start, end]`
///
/// Both ends are inclusive. Two ranges that share a single instant
/// intersect.
///
/// # Example
///
/// ```rust
/// use archive_assembly::types::TimeRange;
///
/// let range = TimeRange::new(1000, 2000).unwrap();
/// assert!(range.contains(1000));
/// assert!(range.contains(2000));
/// assert!(!range.contains(2001));
/// assert_eq!(range.duration(), 1000);
///
/// assert!(TimeRange::new(2000, 1000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First instant (inclusive)
    pub start: Timestamp,

    /// Last instant (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range, rejecting `start > end`
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, crate::error::Error> {
        if start > end {
            return Err(crate::error::Error::InvalidDomain(format!(
                "Invalid time range: start {} > end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Create a new time range without validation
    pub fn new_unchecked(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Closed-interval intersection test
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest range covering both
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// `end - start` in nanoseconds
    pub fn duration(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// Wire tag for the values carried by a fragment
///
/// The first seven tags are supported by the column model. `Array`,
/// `Structure` and `Image` are recognised on the wire but cannot be
/// materialised into table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean
    Bool,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Instant in nanoseconds since the epoch
    Timestamp,
    /// Nested array (unsupported in columns)
    Array,
    /// Nested structure (unsupported in columns)
    Structure,
    /// Binary image (unsupported in columns)
    Image,
}

impl ValueType {
    /// True if columns can hold values of this type
    pub fn is_supported(&self) -> bool {
        match self {
            ValueType::Bool
            | ValueType::Int
            | ValueType::Long
            | ValueType::Float
            | ValueType::Double
            | ValueType::String
            | ValueType::Timestamp => true,
            ValueType::Array | ValueType::Structure | ValueType::Image => false,
        }
    }

    /// Approximate in-memory size of one value of this type
    pub fn value_size(&self) -> usize {
        match self {
            ValueType::Bool => 1,
            ValueType::Int | ValueType::Float => 4,
            ValueType::Long | ValueType::Double | ValueType::Timestamp => 8,
            ValueType::String => 24,
            ValueType::Array | ValueType::Structure | ValueType::Image => 0,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "BOOL",
            ValueType::Int => "INT",
            ValueType::Long => "LONG",
            ValueType::Float => "FLOAT",
            ValueType::Double => "DOUBLE",
            ValueType::String => "STRING",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Array => "ARRAY",
            ValueType::Structure => "STRUCTURE",
            ValueType::Image => "IMAGE",
        };
        write!(f, "{}", name)
    }
}

/// A single sample value
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Missing sample
    #[default]
    Null,
    /// Boolean sample
    Bool(bool),
    /// 32-bit integer sample
    Int(i32),
    /// 64-bit integer sample
    Long(i64),
    /// 32-bit float sample
    Float(f32),
    /// 64-bit float sample
    Double(f64),
    /// String sample
    String(String),
    /// Timestamp sample (nanoseconds since the epoch)
    Timestamp(Timestamp),
}

impl Value {
    /// Type tag of this value, `None` for `Null`
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::Long(_) => Some(ValueType::Long),
            Value::Float(_) => Some(ValueType::Float),
            Value::Double(_) => Some(ValueType::Double),
            Value::String(_) => Some(ValueType::String),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
        }
    }

    /// True if this is a missing sample
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True if the value is `Null` or carries the given tag
    pub fn conforms_to(&self, value_type: ValueType) -> bool {
        self.value_type().map_or(true, |t| t == value_type)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Timestamp(v) => Some(*v as f64),
            Value::Null | Value::Bool(_) | Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", format_timestamp(*v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_validation() {
        assert!(TimeRange::new(10, 5).is_err());
        assert!(TimeRange::new(5, 5).is_ok());
    }

    #[test]
    fn test_time_range_intersects_closed() {
        let a = TimeRange::new_unchecked(0, 10);
        let b = TimeRange::new_unchecked(10, 20);
        let c = TimeRange::new_unchecked(11, 20);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert_eq!(a.union(&c), TimeRange::new_unchecked(0, 20));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(
            format_timestamp(1_500_000_000),
            "1970-01-01T00:00:01.500Z"
        );
    }

    #[test]
    fn test_value_type_support() {
        assert!(ValueType::Double.is_supported());
        assert!(ValueType::Timestamp.is_supported());
        assert!(!ValueType::Image.is_supported());
        assert!(!ValueType::Array.is_supported());
    }

    #[test]
    fn test_value_conformance() {
        assert!(Value::Null.conforms_to(ValueType::Long));
        assert!(Value::Long(3).conforms_to(ValueType::Long));
        assert!(!Value::Int(3).conforms_to(ValueType::Long));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::String("a".into()).as_f64(), None);
    }
}
