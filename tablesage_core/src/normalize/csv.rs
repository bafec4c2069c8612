use std::collections::HashSet;

use ::csv::ReaderBuilder;

use crate::error::{PipelineError, Result};
use crate::table::CanonicalTable;

/// Parses CSV bytes with the first record as header.
pub fn read_csv(raw: &[u8]) -> Result<CanonicalTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw);

    let header = reader
        .byte_headers()
        .map_err(|e| PipelineError::UnparsableSource(e.to_string()))?
        .clone();
    if header.is_empty() {
        return Err(PipelineError::UnparsableSource("the file is empty".to_string()));
    }

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let name = String::from_utf8_lossy(field);
            let name = if i == 0 { name.trim_start_matches('\u{feff}') } else { &*name };
            name.trim().to_string()
        })
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    for (i, name) in columns.iter().enumerate() {
        if name.is_empty() {
            return Err(PipelineError::Schema(format!("column {} has a blank name", i + 1)));
        }
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Schema(format!("duplicate column name '{}'", name)));
        }
    }

    let mut rows = Vec::new();
    for (i, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|e| PipelineError::UnparsableSource(e.to_string()))?;
        if record.len() > columns.len() {
            return Err(PipelineError::UnparsableSource(format!(
                "line {} has {} fields, expected {}",
                i + 2,
                record.len(),
                columns.len()
            )));
        }
        rows.push(
            record
                .iter()
                .map(|field| Some(String::from_utf8_lossy(field).into_owned()))
                .collect::<Vec<_>>(),
        );
    }

    if rows.is_empty() {
        return Err(PipelineError::UnparsableSource(
            "the file has a header but no data rows".to_string(),
        ));
    }

    CanonicalTable::from_text(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::types::Value;

    #[test]
    fn test_round_trip_schema_and_rows() {
        let table = read_csv(b"a,b,c\n1,x,2.5\n2,y,3.5\n").unwrap();
        assert_eq!(table.columns(), ["a", "b", "c"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.rows()[1],
            vec![Value::Integer(2), Value::text("y"), Value::Float(3.5)]
        );
    }

    #[test]
    fn test_duplicate_header_after_trimming() {
        let err = read_csv(b"name, name ,age\nA,B,1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_blank_header_rejected() {
        let err = read_csv(b"name,,age\nA,B,1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_short_rows_padded_long_rows_rejected() {
        let table = read_csv(b"a,b,c\n1,2\n").unwrap();
        assert_eq!(table.rows()[0], vec![Value::Integer(1), Value::Integer(2), Value::Null]);

        let err = read_csv(b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, PipelineError::UnparsableSource(_)));
    }

    #[test]
    fn test_empty_inputs_unparsable() {
        assert!(matches!(read_csv(b""), Err(PipelineError::UnparsableSource(_))));
        assert!(matches!(read_csv(b"a,b\n"), Err(PipelineError::UnparsableSource(_))));
    }

    #[test]
    fn test_bom_and_quoted_fields() {
        let table = read_csv("\u{feff}city,note\n\"New York, NY\",\"said \"\"hi\"\"\"\n".as_bytes()).unwrap();
        assert_eq!(table.columns(), ["city", "note"]);
        assert_eq!(table.rows()[0][0], Value::text("New York, NY"));
        assert_eq!(table.rows()[0][1], Value::text("said \"hi\""));
    }

    #[test]
    fn test_number_like_words_and_zip_codes_kept_verbatim() {
        let table = read_csv(b"zip,name\n02134,Nan\n00501,Inf\n").unwrap();
        assert_eq!(
            serde_json::to_string(&table.records()).unwrap(),
            r#"[{"zip":"02134","name":"Nan"},{"zip":"00501","name":"Inf"}]"#
        );
    }
}
