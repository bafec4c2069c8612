use std::time::Instant;

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::table::CanonicalTable;
use crate::translate::TranslatedQuery;

pub mod aggregate;
pub mod engine;
pub mod filter;

pub use engine::{MemoryEngine, ResultSet};

/// Outcome of running one query. Engine rejections are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(ResultSet),
    Failed { message: String },
}

impl QueryResult {
    /// Converts a failure into `PipelineError::QueryExecution` carrying `query`.
    pub fn into_result(self, query: &str) -> Result<ResultSet> {
        match self {
            QueryResult::Rows(rows) => Ok(rows),
            QueryResult::Failed { message } => Err(PipelineError::QueryExecution {
                query: query.to_string(),
                message,
            }),
        }
    }
}

/// Runs queries against a dataset, each inside its own throwaway engine.
pub struct QueryExecutor {
    table_name: String,
}

impl QueryExecutor {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    pub fn execute(&self, query: &TranslatedQuery, table: &CanonicalTable) -> QueryResult {
        self.execute_sql(query.raw_text(), table)
    }

    pub fn execute_sql(&self, sql: &str, table: &CanonicalTable) -> QueryResult {
        let start = Instant::now();

        let mut engine = MemoryEngine::new();
        engine.load_table(&self.table_name, table);

        match engine.query(sql) {
            Ok(rows) => {
                info!(rows = rows.len(), elapsed = ?start.elapsed(), "query executed");
                QueryResult::Rows(rows)
            }
            Err(e) => {
                warn!(sql, error = %e, "query rejected");
                QueryResult::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::types::Value;

    fn people() -> CanonicalTable {
        CanonicalTable::new(
            vec!["name".into(), "age".into()],
            vec![
                vec![Value::text("John"), Value::Integer(25)],
                vec![Value::text("Jane"), Value::Integer(17)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_execution() {
        let executor = QueryExecutor::new("dataset");
        let query = TranslatedQuery::new(
            "SELECT name FROM dataset WHERE age > 20",
            "Who is an adult?",
            vec!["name".into(), "age".into()],
        );

        match executor.execute(&query, &people()) {
            QueryResult::Rows(rows) => {
                let json = serde_json::to_string(&rows.records()).unwrap();
                assert_eq!(json, r#"[{"name":"John"}]"#);
            }
            other => panic!("Expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_is_captured() {
        let executor = QueryExecutor::new("dataset");
        let result = executor.execute_sql("SELECT salary FROM dataset", &people());

        match &result {
            QueryResult::Failed { message } => assert!(message.contains("salary")),
            other => panic!("Expected failure, got {:?}", other),
        }

        let err = result.into_result("SELECT salary FROM dataset").unwrap_err();
        assert!(matches!(err, PipelineError::QueryExecution { .. }));
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_each_call_gets_a_fresh_engine() {
        let executor = QueryExecutor::new("dataset");
        let other = CanonicalTable::new(vec!["x".into()], vec![vec![Value::Integer(1)]]).unwrap();

        assert!(matches!(
            executor.execute_sql("SELECT x FROM dataset", &other),
            QueryResult::Rows(_)
        ));
        assert!(matches!(
            executor.execute_sql("SELECT x FROM dataset", &people()),
            QueryResult::Failed { .. }
        ));
    }
}
