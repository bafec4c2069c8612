use std::collections::HashMap;

use tracing::{info, warn};

use super::{TableExtractor, TextExtractor};
use crate::error::{PipelineError, Result};
use crate::sql::types::Value;
use crate::table::{CanonicalTable, RawTable};

/// Probed in this order; the first one present in a line wins.
const LINE_DELIMITERS: [char; 4] = [',', '\t', '|', ';'];

const NO_DATA_MESSAGE: &str = "No structured data found in PDF";

pub(super) fn read_pdf(
    raw: &[u8],
    tables: &dyn TableExtractor,
    text: &dyn TextExtractor,
) -> Result<CanonicalTable> {
    let mut candidates = match tables.extract_tables(raw) {
        Ok(candidates) => candidates,
        Err(e) => return Ok(extraction_failure(e)),
    };

    info!(tables = candidates.len(), "PDF table extraction finished");

    let table = match candidates.len() {
        0 => return Ok(text_fallback(raw, text)),
        1 => table_from_raw(candidates.remove(0)),
        _ => merge_tables(candidates),
    };

    match table {
        Ok(table) if table.is_empty() => Err(PipelineError::UnparsableSource(
            "the detected tables contain no rows".to_string(),
        )),
        Ok(table) => Ok(table),
        Err(e) => Ok(extraction_failure(e)),
    }
}

fn extraction_failure(err: impl std::fmt::Display) -> CanonicalTable {
    warn!(error = %err, "PDF extraction failed");
    CanonicalTable::diagnostic("Error", format!("Failed to extract data: {}", err))
}

fn text_fallback(raw: &[u8], text: &dyn TextExtractor) -> CanonicalTable {
    let content = match text.extract_text(raw) {
        Ok(content) => content,
        Err(e) => return extraction_failure(e),
    };

    match split_text_lines(&content) {
        Some(table) => {
            info!(rows = table.row_count(), "built table from PDF text lines");
            table
        }
        None => CanonicalTable::diagnostic("Message", NO_DATA_MESSAGE),
    }
}

/// Splits free text into rows on the first delimiter each line contains.
/// Returns `None` when the text has no non-blank lines.
pub fn split_text_lines(content: &str) -> Option<CanonicalTable> {
    let data: Vec<Vec<String>> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match LINE_DELIMITERS.iter().find(|d| line.contains(**d)) {
            Some(delimiter) => line.split(*delimiter).map(str::to_string).collect(),
            None => vec![line.to_string()],
        })
        .collect();

    let width = data.iter().map(Vec::len).max()?;
    let columns = (1..=width).map(|i| format!("Column_{}", i)).collect();
    let rows = data
        .into_iter()
        .map(|mut row| {
            row.resize(width, String::new());
            row.into_iter().map(Value::Text).collect()
        })
        .collect();

    CanonicalTable::new(columns, rows).ok()
}

/// Makes extracted column names usable: blanks get a positional name and
/// repeats get a numeric suffix.
fn unique_column_names(columns: &[String]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(columns.len());
    for (i, raw) in columns.iter().enumerate() {
        let base = match raw.trim() {
            "" => format!("Column_{}", i + 1),
            name => name.to_string(),
        };
        let mut candidate = base.clone();
        while counts.contains_key(&candidate) {
            let n = counts.get_mut(&base).map(|n| {
                *n += 1;
                *n
            });
            candidate = format!("{}_{}", base, n.unwrap_or(2));
        }
        counts.insert(candidate.clone(), 1);
        names.push(candidate);
    }
    names
}

fn table_from_raw(raw: RawTable) -> Result<CanonicalTable> {
    let columns = unique_column_names(&raw.columns);
    CanonicalTable::from_text(columns, raw.rows)
}

/// Union-schema merge: all columns of all tables (first seen first), every
/// row of every table in order, missing cells as null.
pub fn merge_tables(tables: Vec<RawTable>) -> Result<CanonicalTable> {
    let mut union: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut prepared = Vec::with_capacity(tables.len());

    for table in tables {
        let columns = unique_column_names(&table.columns);
        for name in &columns {
            if !positions.contains_key(name) {
                positions.insert(name.clone(), union.len());
                union.push(name.clone());
            }
        }
        prepared.push((columns, table.rows));
    }

    let mut rows = Vec::new();
    for (table_no, (columns, table_rows)) in prepared.into_iter().enumerate() {
        let targets: Vec<usize> = columns.iter().map(|name| positions[name]).collect();
        for (row_no, row) in table_rows.into_iter().enumerate() {
            if row.len() > targets.len() {
                return Err(PipelineError::Schema(format!(
                    "row {} of table {} has {} values but the table has {} columns",
                    row_no + 1,
                    table_no + 1,
                    row.len(),
                    targets.len()
                )));
            }
            let mut merged = vec![None; union.len()];
            for (cell, target) in row.into_iter().zip(&targets) {
                merged[*target] = cell;
            }
            rows.push(merged);
        }
    }

    CanonicalTable::from_text(union, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTables(Vec<RawTable>);

    impl TableExtractor for FixedTables {
        fn extract_tables(&self, _pdf: &[u8]) -> anyhow::Result<Vec<RawTable>> {
            Ok(self.0.clone())
        }
    }

    struct FixedText(Option<String>);

    impl TextExtractor for FixedText {
        fn extract_text(&self, _pdf: &[u8]) -> anyhow::Result<String> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("PdfReadError: EOF marker not found"))
        }
    }

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        )
    }

    #[test]
    fn test_union_merge_keeps_all_rows_and_columns() {
        let merged = merge_tables(vec![
            raw(&["x", "y"], &[&["1", "a"], &["2", "b"]]),
            raw(&["y", "z"], &[&["c", "true"]]),
        ])
        .unwrap();

        assert_eq!(merged.columns(), ["x", "y", "z"]);
        assert_eq!(merged.row_count(), 3);
        assert_eq!(merged.get(0, "z"), Some(&Value::Null));
        assert_eq!(merged.get(1, "x"), Some(&Value::Integer(2)));
        assert_eq!(merged.get(2, "x"), Some(&Value::Null));
        assert_eq!(merged.get(2, "y"), Some(&Value::text("c")));
        assert_eq!(merged.get(2, "z"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_overlong_rows_rejected_on_every_path() {
        let merged = merge_tables(vec![
            raw(&["x"], &[&["1"]]),
            raw(&["y"], &[&["2", "extra"]]),
        ]);
        assert!(matches!(merged, Err(PipelineError::Schema(_))));

        let single = vec![raw(&["x"], &[&["1", "extra"]])];
        let multiple = vec![raw(&["x"], &[&["1"]]), raw(&["y"], &[&["2", "extra"]])];
        for tables in [single, multiple] {
            let table = read_pdf(b"pdf", &FixedTables(tables), &FixedText(None)).unwrap();
            assert_eq!(table.columns(), ["Error"]);
            match table.get(0, "Error") {
                Some(Value::Text(message)) => assert!(message.contains("has 2 values but the table has 1 columns")),
                other => panic!("Expected diagnostic text, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_ragged_lines_padded_with_empty_text() {
        let table = split_text_lines("a,b,c\n\n  \nd,e\n").unwrap();
        assert_eq!(table.columns(), ["Column_1", "Column_2", "Column_3"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(1, "Column_3"), Some(&Value::text("")));
    }

    #[test]
    fn test_delimiter_priority_and_plain_lines() {
        let table = split_text_lines("a|b;c\nplain words\nx\ty,z").unwrap();
        assert_eq!(table.rows()[0], vec![Value::text("a"), Value::text("b;c")]);
        assert_eq!(table.rows()[1], vec![Value::text("plain words"), Value::text("")]);
        assert_eq!(table.rows()[2], vec![Value::text("x\ty"), Value::text("z")]);
        assert!(split_text_lines(" \n\n").is_none());
    }

    #[test]
    fn test_no_tables_falls_back_to_text() {
        let table = read_pdf(
            b"pdf",
            &FixedTables(vec![]),
            &FixedText(Some("name,qty\nbolt,4".to_string())),
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(1, "Column_2"), Some(&Value::text("4")));
    }

    #[test]
    fn test_empty_text_yields_message_table() {
        let table = read_pdf(b"pdf", &FixedTables(vec![]), &FixedText(Some(String::new()))).unwrap();
        assert_eq!(table.columns(), ["Message"]);
        assert_eq!(table.rows()[0][0], Value::text(NO_DATA_MESSAGE));
    }

    #[test]
    fn test_text_failure_yields_error_table() {
        let table = read_pdf(b"pdf", &FixedTables(vec![]), &FixedText(None)).unwrap();
        assert_eq!(table.columns(), ["Error"]);
        assert_eq!(
            table.rows()[0][0],
            Value::text("Failed to extract data: PdfReadError: EOF marker not found")
        );
    }

    #[test]
    fn test_single_table_used_directly() {
        let table = read_pdf(
            b"pdf",
            &FixedTables(vec![raw(&["Product", "Qty", "Qty"], &[&["Widget A", "5", "6"]])]),
            &FixedText(None),
        )
        .unwrap();
        assert_eq!(table.columns(), ["Product", "Qty", "Qty_2"]);
        assert_eq!(table.get(0, "Qty_2"), Some(&Value::Integer(6)));
    }

    #[test]
    fn test_tables_without_rows_are_unparsable() {
        let err = read_pdf(
            b"pdf",
            &FixedTables(vec![raw(&["a"], &[]), raw(&["b"], &[])]),
            &FixedText(None),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnparsableSource(_)));
    }
}
