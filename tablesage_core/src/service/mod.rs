//! Request orchestration: upload, listing and question answering over the
//! registered datasets.
//!
//! An [`Orchestrator`] owns the registry and the upload store and wires the
//! normalizer, translator and executor together. It is `Send + Sync`; share
//! it behind an `Arc` to serve concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::executor::{QueryExecutor, ResultSet};
use crate::normalize::{Normalizer, SourceKind, TableExtractor, TextExtractor, UnavailableExtractor};
use crate::registry::{DatasetRecord, DatasetRegistry, DatasetSummary};
use crate::storage::{sanitize_filename, UploadStore};
use crate::table::CanonicalTable;
use crate::translate::{GeminiModel, LanguageModel, QueryTranslator, UnconfiguredModel};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    pub display_name: String,
    pub schema: Vec<String>,
    pub sample_rows: Vec<Map<String, JsonValue>>,
    pub row_count: usize,
    pub column_count: usize,
    pub source_kind: SourceKind,
}

impl From<&DatasetRecord> for UploadResponse {
    fn from(record: &DatasetRecord) -> Self {
        Self {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            schema: record.schema.clone(),
            sample_rows: record.sample_records(),
            row_count: record.row_count,
            column_count: record.column_count,
            source_kind: record.source_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub translated_query_text: String,
    pub result_rows: Vec<Map<String, JsonValue>>,
}

pub struct Orchestrator {
    config: Config,
    normalizer: Normalizer,
    registry: DatasetRegistry,
    store: UploadStore,
    translator: QueryTranslator,
    executor: QueryExecutor,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Orchestrator with default collaborators for `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn upload(&self, raw: &[u8], filename: &str) -> Result<UploadResponse> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(PipelineError::InvalidRequest("no file selected".to_string()));
        }

        let kind = SourceKind::from_filename(filename)?;
        if raw.len() > self.config.max_upload_bytes {
            return Err(PipelineError::PayloadTooLarge {
                size: raw.len(),
                limit: self.config.max_upload_bytes,
            });
        }
        let display_name = sanitize_filename(filename)
            .ok_or_else(|| PipelineError::InvalidRequest(format!("unusable filename '{}'", filename)))?;

        info!(name = %display_name, kind = %kind, bytes = raw.len(), "upload received");

        let table = self.normalizer.normalize(raw, kind)?;
        let stored = self.store.put(&display_name, raw)?;
        let id = match self.registry.register(&display_name, &stored, kind, &table) {
            Ok(id) => id,
            Err(e) => {
                if let Err(remove_err) = self.store.remove(&stored) {
                    warn!(path = %stored.path.display(), error = %remove_err, "orphaned upload left on disk");
                }
                return Err(e);
            }
        };
        let record = self.registry.lookup(&id)?;

        Ok(UploadResponse::from(record.as_ref()))
    }

    pub fn list_datasets(&self) -> Vec<DatasetSummary> {
        self.registry.list()
    }

    pub fn dataset(&self, id: &str) -> Result<Arc<DatasetRecord>> {
        self.registry.lookup(id)
    }

    pub fn analyze_dataset(&self, id: &str, question: &str) -> Result<AnalysisResponse> {
        let id = id.trim();
        let question = question.trim();
        if id.is_empty() {
            return Err(PipelineError::InvalidRequest("a dataset id is required".to_string()));
        }
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest("a question is required".to_string()));
        }

        let record = self.registry.lookup(id)?;
        let table = self.reload(&record)?;

        let query = self
            .translator
            .translate(question, &record.schema, &record.sample_rows)?;
        let rows = self
            .executor
            .execute(&query, &table)
            .into_result(query.raw_text())?;

        info!(id, rows = rows.len(), "question answered");
        Ok(AnalysisResponse {
            translated_query_text: query.raw_text().to_string(),
            result_rows: rows.records(),
        })
    }

    /// Runs SQL against a dataset without going through the model.
    pub fn run_sql(&self, id: &str, sql: &str) -> Result<ResultSet> {
        let record = self.registry.lookup(id.trim())?;
        let table = self.reload(&record)?;
        self.executor.execute_sql(sql, &table).into_result(sql)
    }

    /// Re-reads and re-normalizes the stored upload behind `record`.
    fn reload(&self, record: &DatasetRecord) -> Result<CanonicalTable> {
        let raw = self.store.read(&record.source_path).map_err(|e| {
            warn!(id = %record.id, path = %record.source_path.display(), error = %e, "stored upload unreadable");
            PipelineError::Internal(format!(
                "source file of dataset {} is no longer readable: {}",
                record.id, e
            ))
        })?;
        self.normalizer.normalize(&raw, record.source_kind)
    }
}

pub struct OrchestratorBuilder {
    config: Config,
    table_extractor: Option<Arc<dyn TableExtractor>>,
    text_extractor: Option<Arc<dyn TextExtractor>>,
    model: Option<Arc<dyn LanguageModel>>,
    registry: Option<DatasetRegistry>,
    store: Option<UploadStore>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            table_extractor: None,
            text_extractor: None,
            model: None,
            registry: None,
            store: None,
        }
    }

    pub fn table_extractor(mut self, extractor: Arc<dyn TableExtractor>) -> Self {
        self.table_extractor = Some(extractor);
        self
    }

    pub fn text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn registry(mut self, registry: DatasetRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: UploadStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;

        let store = match self.store {
            Some(store) => store,
            None => match &config.upload_dir {
                Some(dir) => UploadStore::new(dir)?,
                None => UploadStore::temporary()?,
            },
        };
        let registry = self
            .registry
            .unwrap_or_else(|| DatasetRegistry::new().with_sample_rows(config.sample_rows));
        let model = match self.model {
            Some(model) => model,
            None => default_model(&config),
        };
        let normalizer = Normalizer::new(
            self.table_extractor.unwrap_or_else(|| Arc::new(UnavailableExtractor)),
            self.text_extractor.unwrap_or_else(|| Arc::new(UnavailableExtractor)),
        );

        info!(upload_dir = %store.dir().display(), table = %config.table_name, "orchestrator ready");

        Ok(Orchestrator {
            translator: QueryTranslator::new(model, config.table_name.clone()),
            executor: QueryExecutor::new(config.table_name.clone()),
            normalizer,
            registry,
            store,
            config,
        })
    }
}

/// Gemini when an API key is configured, otherwise a model that always fails.
fn default_model(config: &Config) -> Arc<dyn LanguageModel> {
    let api_key = match &config.api_key {
        Some(key) => key,
        None => {
            warn!("GOOGLE_API_KEY is not set; questions cannot be translated");
            return Arc::new(UnconfiguredModel);
        }
    };

    match GeminiModel::new(
        config.model_endpoint.as_str(),
        config.model_name.as_str(),
        api_key.as_str(),
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            warn!(error = %e, "language model unavailable");
            Arc::new(UnconfiguredModel)
        }
    }
}
