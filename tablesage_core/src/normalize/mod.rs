//! Turns raw uploads into a [`CanonicalTable`].
//!
//! CSV is parsed directly. PDF goes through two black-box collaborators:
//! a table extractor, and a text extractor used when no table is detected.
//! Extraction faults never escape as errors; they become a one-row
//! diagnostic table so an upload always yields something visible.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::table::{CanonicalTable, RawTable};

mod csv;
mod pdf;

pub use self::csv::read_csv;
pub use self::pdf::{merge_tables, split_text_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Pdf,
}

impl SourceKind {
    /// Resolves the kind from a filename extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .ok_or_else(|| PipelineError::UnsupportedFileType(filename.to_string()))?;
        extension
            .parse()
            .map_err(|_| PipelineError::UnsupportedFileType(filename.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Csv => "csv",
            SourceKind::Pdf => "pdf",
        }
    }
}

impl FromStr for SourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SourceKind::Csv),
            "pdf" => Ok(SourceKind::Pdf),
            other => Err(PipelineError::Format(other.to_string())),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects tables inside a PDF document.
pub trait TableExtractor: Send + Sync {
    fn extract_tables(&self, pdf: &[u8]) -> anyhow::Result<Vec<RawTable>>;
}

/// Extracts the full plain text of a PDF document.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, pdf: &[u8]) -> anyhow::Result<String>;
}

/// Stand-in for both extractor roles when no PDF backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl TableExtractor for UnavailableExtractor {
    fn extract_tables(&self, _pdf: &[u8]) -> anyhow::Result<Vec<RawTable>> {
        anyhow::bail!("no PDF table extraction backend is configured")
    }
}

impl TextExtractor for UnavailableExtractor {
    fn extract_text(&self, _pdf: &[u8]) -> anyhow::Result<String> {
        anyhow::bail!("no PDF text extraction backend is configured")
    }
}

pub struct Normalizer {
    tables: Arc<dyn TableExtractor>,
    text: Arc<dyn TextExtractor>,
}

impl Normalizer {
    pub fn new(tables: Arc<dyn TableExtractor>, text: Arc<dyn TextExtractor>) -> Self {
        Self { tables, text }
    }

    /// A normalizer that handles CSV only; PDFs degrade to a diagnostic table.
    pub fn csv_only() -> Self {
        Self::new(Arc::new(UnavailableExtractor), Arc::new(UnavailableExtractor))
    }

    pub fn normalize(&self, raw: &[u8], kind: SourceKind) -> Result<CanonicalTable> {
        let table = match kind {
            SourceKind::Csv => read_csv(raw)?,
            SourceKind::Pdf => pdf::read_pdf(raw, self.tables.as_ref(), self.text.as_ref())?,
        };
        debug!(
            kind = %kind,
            rows = table.row_count(),
            columns = table.column_count(),
            "normalized source"
        );
        Ok(table)
    }

    /// Like [`Normalizer::normalize`] but takes the kind as text, failing with a format error
    /// for anything other than `csv` or `pdf`.
    pub fn normalize_as(&self, raw: &[u8], kind: &str) -> Result<CanonicalTable> {
        self.normalize(raw, kind.parse()?)
    }
}
