/// Module providing Python-backed PDF extraction and model adapters.
#[cfg(feature = "python")]
pub mod bridge;

/// Module holding runtime configuration.
pub mod config;

/// Module defining the pipeline error taxonomy.
pub mod error;

/// Module responsible for executing queries.
pub mod executor;

/// Module turning uploaded CSV and PDF bytes into canonical tables.
pub mod normalize;

/// Module managing the dataset catalog.
pub mod registry;

/// Module wiring upload, listing and analysis together.
pub mod service;

/// Module for SQL parsing and related utilities.
pub mod sql;

/// Module handling persistence of raw uploads.
pub mod storage;

/// Module holding the canonical table representation.
pub mod table;

/// Module translating natural-language questions into SQL.
pub mod translate;

/// Re-exports for the Python adapters.
#[cfg(feature = "python")]
pub use bridge::{PyPdfTextExtractor, PythonModel, TabulaExtractor};

/// Re-export of the runtime configuration.
pub use config::{Config, ConfigError};

/// Re-exports of the error types.
pub use error::{ErrorKind, ErrorResponse, PipelineError, Result};

/// Re-exports of the query executor and its results.
pub use executor::{MemoryEngine, QueryExecutor, QueryResult, ResultSet};

/// Re-exports of the normalizer and its collaborators.
pub use normalize::{Normalizer, SourceKind, TableExtractor, TextExtractor, UnavailableExtractor};

/// Re-exports of the dataset registry.
pub use registry::{DatasetRecord, DatasetRegistry, DatasetSummary};

/// Re-exports of the request orchestrator.
pub use service::{AnalysisResponse, Orchestrator, OrchestratorBuilder, UploadResponse};

/// Re-export of the SQL Parser.
pub use sql::parser::Parser;

/// Re-export of the upload store.
pub use storage::UploadStore;

/// Re-exports of the table types.
pub use table::{CanonicalTable, RawTable};

/// Re-exports of the translator and model adapters.
pub use translate::{GeminiModel, LanguageModel, QueryTranslator, TranslatedQuery, UnconfiguredModel};
