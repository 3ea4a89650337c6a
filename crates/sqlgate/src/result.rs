//! Normalized result shape returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Name and declared type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Column name as reported by the database.
    pub name: String,
    /// Declared type, or `NULL` for expression columns without one.
    pub data_type: String,
}

impl FieldDescriptor {
    /// Creates a field descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// The outcome of a successful, rolled-back execution.
///
/// Serializes to `{ "rows": [...], "rowCount": n, "fields": [{"name", "dataType"}] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Result rows, in the order the database produced them.
    pub rows: Vec<Row>,
    /// Number of rows.
    pub row_count: usize,
    /// Column descriptors, in column order.
    pub fields: Vec<FieldDescriptor>,
}

impl ExecutionResult {
    /// Creates a result; the row count is derived from `rows`.
    #[must_use]
    pub fn new(fields: Vec<FieldDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            fields,
        }
    }

    /// Returns the field names, in column order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns every value of one column.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().filter_map(move |row| row.get(name))
    }
}
