//! Natural-language to SQL translation through an external model.
//!
//! The model is untrusted: its reply is only trimmed here. Whether the text
//! is a runnable query is decided by the executor.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::sql::types::Value;
use crate::table::to_records;

mod gemini;

pub use gemini::{GeminiModel, DEFAULT_ENDPOINT, DEFAULT_MODEL};

/// Text-in, text-out completion service.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Model used when none is configured; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredModel;

impl LanguageModel for UnconfiguredModel {
    fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("no language model is configured (set GOOGLE_API_KEY)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    raw_text: String,
    source_question: String,
    schema: Vec<String>,
}

impl TranslatedQuery {
    pub fn new(raw_text: impl Into<String>, source_question: impl Into<String>, schema: Vec<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            source_question: source_question.into(),
            schema,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn source_question(&self) -> &str {
        &self.source_question
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }
}

pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    table_name: String,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>, table_name: impl Into<String>) -> Self {
        Self {
            model,
            table_name: table_name.into(),
        }
    }

    pub fn build_prompt(&self, question: &str, schema: &[String], sample_rows: &[Vec<Value>]) -> Result<String> {
        let sample = serde_json::to_string_pretty(&to_records(schema, sample_rows))?;
        Ok(format!(
            "You are an assistant that translates natural language questions into SQL queries.\n\
             \n\
             Table: {table}\n\
             Columns: {columns}\n\
             \n\
             Sample rows:\n\
             {sample}\n\
             \n\
             Question: {question}\n\
             \n\
             Write a single SQL SELECT statement against the table {table} that answers the question.\n\
             Return ONLY the SQL query, without any explanation or formatting.",
            table = self.table_name,
            columns = schema.join(", "),
            sample = sample,
            question = question,
        ))
    }

    pub fn translate(&self, question: &str, schema: &[String], sample_rows: &[Vec<Value>]) -> Result<TranslatedQuery> {
        let prompt = self.build_prompt(question, schema, sample_rows)?;
        debug!(prompt_len = prompt.len(), "requesting translation");

        let response = self.model.complete(&prompt).map_err(|e| {
            warn!(error = %e, "translation model failed");
            PipelineError::TranslationUnavailable(e.to_string())
        })?;

        let sql = response.trim();
        if sql.is_empty() {
            return Err(PipelineError::TranslationUnavailable(
                "the model returned an empty response".to_string(),
            ));
        }

        info!(question, sql, "translated question");
        Ok(TranslatedQuery::new(sql, question, schema.to_vec()))
    }
}
