use sqlparser::parser::ParserError;
use thiserror::Error;

/// Failures raised while parsing or evaluating a query in the in-memory engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("SQL parse error: {0}")]
    Parse(#[from] ParserError),

    #[error("unsupported SQL: {0}")]
    Unsupported(String),

    #[error("no such table: {0}")]
    UnknownTable(String),

    #[error("no such column: {0}")]
    UnknownColumn(String),

    #[error("ambiguous column name: {0}")]
    AmbiguousColumn(String),

    #[error("no such function: {0}")]
    UnknownFunction(String),

    #[error("misuse of aggregate function {0}()")]
    AggregateMisuse(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
