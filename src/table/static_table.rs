//! Flattened tables and their text renderings

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{DataTable, NULL_VALUE};
use crate::error::{Error, Result};
use crate::types::{Timestamp, Value, ValueType};

/// Rows shown by the ASCII rendering before eliding the rest
const TABLE_PREVIEW_ROWS: usize = 100;

// ============================================================================
// Static Table
// ============================================================================

/// Fully materialised table: one timestamp vector, one vector per column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticTable {
    timestamps: Vec<Timestamp>,
    columns: Vec<StaticColumn>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct StaticColumn {
    name: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    values: Vec<Value>,
}

impl StaticTable {
    /// Build a table from timestamps and (name, type, values) columns
    pub fn new(
        timestamps: Vec<Timestamp>,
        columns: Vec<(String, ValueType, Vec<Value>)>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        let mut built = Vec::with_capacity(columns.len());
        for (i, (name, value_type, values)) in columns.into_iter().enumerate() {
            if values.len() != timestamps.len() {
                return Err(Error::InconsistentColumnSize {
                    source_name: name,
                    block_start: timestamps.first().copied().unwrap_or_default(),
                    expected: timestamps.len(),
                    actual: values.len(),
                });
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::DuplicateSource {
                    source_name: name,
                    block_start: timestamps.first().copied().unwrap_or_default(),
                });
            }
            built.push(StaticColumn {
                name,
                value_type,
                values,
            });
        }
        Ok(Self {
            timestamps,
            columns: built,
            index,
        })
    }

    /// Copy any table into a flat one
    pub fn from_table<T: DataTable + ?Sized>(table: &T) -> Result<Self> {
        let timestamps = (0..table.row_count())
            .map(|row| table.timestamp(row))
            .collect::<Result<Vec<_>>>()?;
        let columns = (0..table.column_count())
            .map(|col| {
                Ok((
                    table.column_name(col)?.to_string(),
                    table.column_type(col)?,
                    table.column_data(col)?.to_vec(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(timestamps, columns)
    }

    /// Render in the requested format
    pub fn format(&self, format: TableFormat) -> Result<String> {
        match format {
            TableFormat::Json => self.to_json(),
            TableFormat::JsonPretty => self.to_json_pretty(),
            TableFormat::Csv => Ok(self.to_csv()),
            TableFormat::Table => Ok(self.to_table()),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Convert to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Convert to CSV string; nulls are empty fields
    pub fn to_csv(&self) -> String {
        let mut output = String::from("timestamp");
        for column in &self.columns {
            output.push(',');
            output.push_str(&csv_field(&column.name));
        }
        output.push('\n');

        for (row, ts) in self.timestamps.iter().enumerate() {
            output.push_str(&ts.to_string());
            for column in &self.columns {
                output.push(',');
                match &column.values[row] {
                    Value::Null => {}
                    Value::String(s) => output.push_str(&csv_field(s)),
                    other => output.push_str(&other.to_string()),
                }
            }
            output.push('\n');
        }
        output
    }

    /// Convert to ASCII table string
    pub fn to_table(&self) -> String {
        if self.timestamps.is_empty() {
            return "No results".to_string();
        }

        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| c.name.len().max(12))
            .collect();
        let separator = {
            let mut line = format!("+{}", "-".repeat(22));
            for w in &widths {
                line.push('+');
                line.push_str(&"-".repeat(w + 2));
            }
            line.push_str("+\n");
            line
        };

        let mut output = separator.clone();
        output.push_str(&format!("| {:>20} ", "timestamp"));
        for (column, w) in self.columns.iter().zip(&widths) {
            output.push_str(&format!("| {:>w$} ", column.name, w = *w));
        }
        output.push_str("|\n");
        output.push_str(&separator);

        for (row, ts) in self.timestamps.iter().enumerate().take(TABLE_PREVIEW_ROWS) {
            output.push_str(&format!("| {:>20} ", ts));
            for (column, w) in self.columns.iter().zip(&widths) {
                output.push_str(&format!("| {:>w$} ", column.values[row].to_string(), w = *w));
            }
            output.push_str("|\n");
        }
        output.push_str(&separator);

        if self.timestamps.len() > TABLE_PREVIEW_ROWS {
            output.push_str(&format!(
                "... and {} more rows\n",
                self.timestamps.len() - TABLE_PREVIEW_ROWS
            ));
        }
        output.push_str(&format!(
            "\n{} rows x {} columns\n",
            self.timestamps.len(),
            self.columns.len()
        ));
        output
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

impl DataTable for StaticTable {
    fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, col: usize) -> Result<&str> {
        self.columns
            .get(col)
            .map(|c| c.name.as_str())
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    fn column_type(&self, col: usize) -> Result<ValueType> {
        self.columns
            .get(col)
            .map(|c| c.value_type)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))
    }

    fn timestamp(&self, row: usize) -> Result<Timestamp> {
        self.timestamps
            .get(row)
            .copied()
            .ok_or_else(|| Error::row_out_of_bounds(row, self.timestamps.len()))
    }

    fn value(&self, row: usize, col: usize) -> Result<&Value> {
        let column = self
            .columns
            .get(col)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))?;
        if row >= self.timestamps.len() {
            return Err(Error::row_out_of_bounds(row, self.timestamps.len()));
        }
        Ok(column.values.get(row).unwrap_or(&NULL_VALUE))
    }

    fn column_data(&self, col: usize) -> Result<Arc<[Value]>> {
        self.columns
            .get(col)
            .map(|c| Arc::from(c.values.as_slice()))
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))
    }

    fn timestamps(&self) -> Vec<Timestamp> {
        self.timestamps.clone()
    }
}

// ============================================================================
// Table Format
// ============================================================================

/// Text rendering for static tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    /// Compact JSON
    #[default]
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// CSV format
    Csv,
    /// ASCII table (for CLI)
    Table,
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Json => write!(f, "json"),
            TableFormat::JsonPretty => write!(f, "json-pretty"),
            TableFormat::Csv => write!(f, "csv"),
            TableFormat::Table => write!(f, "table"),
        }
    }
}

impl std::str::FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TableFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(TableFormat::JsonPretty),
            "csv" => Ok(TableFormat::Csv),
            "table" => Ok(TableFormat::Table),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StaticTable {
        StaticTable::new(
            vec![10, 20, 30],
            vec![
                (
                    "temp".to_string(),
                    ValueType::Double,
                    vec![Value::Double(1.5), Value::Null, Value::Double(3.0)],
                ),
                (
                    "label".to_string(),
                    ValueType::String,
                    vec![
                        Value::String("a,b".to_string()),
                        Value::String("c".to_string()),
                        Value::Null,
                    ],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_csv_output() {
        let csv = sample().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,temp,label");
        assert_eq!(lines[1], "10,1.5,\"a,b\"");
        assert_eq!(lines[2], "20,,c");
        assert_eq!(lines[3], "30,3,");
    }

    #[test]
    fn test_json_output() {
        let json = sample().to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["timestamps"][1], 20);
        assert_eq!(parsed["columns"][0]["name"], "temp");
        assert_eq!(parsed["columns"][0]["type"], "double");
        assert!(parsed["columns"][0]["values"][1].is_null());
    }

    #[test]
    fn test_table_output() {
        let table = sample().to_table();
        assert!(table.contains("timestamp"));
        assert!(table.contains("3 rows x 2 columns"));
        let empty = StaticTable::new(Vec::new(), Vec::new()).unwrap();
        assert_eq!(empty.to_table(), "No results");
    }

    #[test]
    fn test_data_table_access() {
        let table = sample();
        assert_eq!(table.column_index("label").unwrap(), 1);
        assert_eq!(table.value(0, 0).unwrap(), &Value::Double(1.5));
        assert!(table.value(3, 0).is_err());
        assert!(table.value_by_name(0, "missing").is_err());
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let err = StaticTable::new(
            vec![1, 2],
            vec![("x".to_string(), ValueType::Int, vec![Value::Int(1)])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InconsistentColumnSize { .. }));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("csv".parse::<TableFormat>().unwrap(), TableFormat::Csv);
        assert_eq!("JSON".parse::<TableFormat>().unwrap(), TableFormat::Json);
        assert!("xml".parse::<TableFormat>().is_err());
    }
}
