use serde::Serialize;
use thiserror::Error;

/// Stable classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnsupportedFileType,
    PayloadTooLarge,
    UnparsableSource,
    SchemaError,
    FormatError,
    IdentifierCollision,
    NotFound,
    InvalidRequest,
    TranslationUnavailable,
    QueryExecutionError,
    InternalFault,
}

impl ErrorKind {
    /// HTTP-equivalent status used by whatever transport sits in front of the pipeline.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::UnsupportedFileType | ErrorKind::InvalidRequest | ErrorKind::FormatError => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::SchemaError | ErrorKind::UnparsableSource | ErrorKind::QueryExecutionError => 422,
            ErrorKind::TranslationUnavailable => 502,
            ErrorKind::IdentifierCollision | ErrorKind::InternalFault => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File type not allowed: '{0}'. Please upload a CSV or PDF file.")]
    UnsupportedFileType(String),

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Could not extract any rows: {0}")]
    UnparsableSource(String),

    #[error("Invalid header: {0}")]
    Schema(String),

    #[error("Unrecognized source kind: '{0}'")]
    Format(String),

    #[error("Dataset identifier {0} is already registered")]
    IdentifierCollision(String),

    #[error("Dataset {0} not found")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("Query failed: {message}")]
    QueryExecution { query: String, message: String },

    #[error("Internal fault: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFileType(_) => ErrorKind::UnsupportedFileType,
            PipelineError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            PipelineError::UnparsableSource(_) => ErrorKind::UnparsableSource,
            PipelineError::Schema(_) => ErrorKind::SchemaError,
            PipelineError::Format(_) => ErrorKind::FormatError,
            PipelineError::IdentifierCollision(_) => ErrorKind::IdentifierCollision,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::TranslationUnavailable(_) => ErrorKind::TranslationUnavailable,
            PipelineError::QueryExecution { .. } => ErrorKind::QueryExecutionError,
            PipelineError::Internal(_) | PipelineError::Io(_) | PipelineError::Json(_) => {
                ErrorKind::InternalFault
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boundary shape for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
