//! Canonical in-memory table shared by every ingestion path.

use std::collections::HashSet;

use serde_json::{Map, Value as JsonValue};

use crate::error::{PipelineError, Result};
use crate::sql::types::Value;

pub mod infer;

/// A table as handed over by an extraction collaborator: header plus
/// untyped cells, possibly ragged, `None` for missing cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }
}

/// Named columns and row-major records. Every row holds exactly one value
/// per column; short rows are padded with `Null` when the table is built.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl CanonicalTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::Schema(format!("duplicate column name '{}'", name)));
            }
        }

        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                if row.len() > width {
                    return Err(PipelineError::Schema(format!(
                        "row {} has {} values but the table has {} columns",
                        i + 1,
                        row.len(),
                        width
                    )));
                }
                row.resize(width, Value::Null);
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns, rows })
    }

    /// Builds a table from untyped cells, inferring one type per column.
    pub fn from_text(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let width = columns.len();
        let mut cells_by_column: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(rows.len()); width];
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(PipelineError::Schema(format!(
                    "row {} has {} values but the table has {} columns",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            row.resize(width, None);
            for (column, cell) in cells_by_column.iter_mut().zip(row) {
                column.push(cell);
            }
        }

        let typed_columns: Vec<Vec<Value>> = cells_by_column
            .into_iter()
            .map(infer::infer_column)
            .collect();

        let row_count = typed_columns.first().map(Vec::len).unwrap_or(0);
        let mut typed_rows: Vec<Vec<Value>> = (0..row_count).map(|_| Vec::with_capacity(width)).collect();
        for column in typed_columns {
            for (row, value) in typed_rows.iter_mut().zip(column) {
                row.push(value);
            }
        }

        Self::new(columns, typed_rows)
    }

    /// One-row, one-column table carrying a human-readable message.
    pub fn diagnostic(column: &str, message: impl Into<String>) -> Self {
        Self {
            columns: vec![column.to_string()],
            rows: vec![vec![Value::Text(message.into())]],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn head(&self, n: usize) -> Vec<Vec<Value>> {
        self.rows.iter().take(n).cloned().collect()
    }

    /// Order-preserving column→value mapping for every row.
    pub fn records(&self) -> Vec<Map<String, JsonValue>> {
        to_records(&self.columns, &self.rows)
    }
}

pub fn to_records(columns: &[String], rows: &[Vec<Value>]) -> Vec<Map<String, JsonValue>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_rows_are_padded_with_null() {
        let table = CanonicalTable::new(
            cols(&["a", "b", "c"]),
            vec![vec![Value::Integer(1)], vec![Value::Integer(2), Value::text("x"), Value::Null]],
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0], vec![Value::Integer(1), Value::Null, Value::Null]);
        assert_eq!(table.get(1, "b"), Some(&Value::text("x")));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = CanonicalTable::new(cols(&["a", "a"]), vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_from_text_infers_per_column() {
        let table = CanonicalTable::from_text(
            cols(&["name", "age", "score"]),
            vec![
                vec![Some("Ann".into()), Some("31".into()), Some("1.5".into())],
                vec![Some("Bob".into()), Some("".into())],
            ],
        )
        .unwrap();

        assert_eq!(
            table.rows()[0],
            vec![Value::text("Ann"), Value::Integer(31), Value::Float(1.5)]
        );
        assert_eq!(table.rows()[1], vec![Value::text("Bob"), Value::Null, Value::Null]);
    }

    #[test]
    fn test_records_keep_column_order() {
        let table = CanonicalTable::new(
            cols(&["z", "a"]),
            vec![vec![Value::Integer(1), Value::text("q")]],
        )
        .unwrap();
        let json = serde_json::to_string(&table.records()).unwrap();
        assert_eq!(json, r#"[{"z":1,"a":"q"}]"#);
    }
}
