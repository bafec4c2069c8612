//! Process-lifetime catalog of uploaded datasets.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::normalize::SourceKind;
use crate::sql::types::Value;
use crate::storage::StoredUpload;
use crate::table::{to_records, CanonicalTable};

/// How many fresh identifiers `register` tries before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

pub const DEFAULT_SAMPLE_ROWS: usize = 5;

pub type IdGenerator = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Display-name fingerprint plus a random token.
pub fn generate_dataset_id(display_name: &str) -> String {
    let digest = Sha256::digest(display_name.as_bytes());
    let fingerprint: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", fingerprint, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub id: String,
    pub display_name: String,
    pub source_kind: SourceKind,
    pub schema: Vec<String>,
    pub sample_rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub column_count: usize,
    pub source_path: PathBuf,
    pub content_digest: String,
    pub byte_len: u64,
}

impl DatasetRecord {
    pub fn sample_records(&self) -> Vec<Map<String, JsonValue>> {
        to_records(&self.schema, &self.sample_rows)
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            schema: self.schema.clone(),
            row_count: self.row_count,
            column_count: self.column_count,
            source_kind: self.source_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub display_name: String,
    pub schema: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub source_kind: SourceKind,
}

pub struct DatasetRegistry {
    records: RwLock<HashMap<String, Arc<DatasetRecord>>>,
    generate_id: IdGenerator,
    sample_rows: usize,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::with_id_generator(Box::new(generate_dataset_id))
    }

    pub fn with_id_generator(generate_id: IdGenerator) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            generate_id,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Stores a record under its id. Never replaces an existing record.
    pub fn insert(&self, record: DatasetRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(PipelineError::IdentifierCollision(record.id));
        }
        records.insert(record.id.clone(), Arc::new(record));
        Ok(())
    }

    /// Records a normalized upload and returns its freshly allocated id.
    pub fn register(
        &self,
        display_name: &str,
        source: &StoredUpload,
        source_kind: SourceKind,
        table: &CanonicalTable,
    ) -> Result<String> {
        let mut record = DatasetRecord {
            id: String::new(),
            display_name: display_name.to_string(),
            source_kind,
            schema: table.columns().to_vec(),
            sample_rows: table.head(self.sample_rows),
            row_count: table.row_count(),
            column_count: table.column_count(),
            source_path: source.path.clone(),
            content_digest: source.digest.clone(),
            byte_len: source.byte_len,
        };

        for attempt in 1..=MAX_ID_ATTEMPTS {
            record.id = (self.generate_id)(display_name);
            match self.insert(record.clone()) {
                Ok(()) => {
                    info!(id = %record.id, name = display_name, rows = record.row_count, "registered dataset");
                    return Ok(record.id);
                }
                Err(PipelineError::IdentifierCollision(id)) => {
                    warn!(%id, attempt, "dataset id collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(PipelineError::Internal(format!(
            "could not allocate a unique id for '{}' after {} attempts",
            display_name, MAX_ID_ATTEMPTS
        )))
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<DatasetRecord>> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// Summaries ordered by display name, then id.
    pub fn list(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> =
            self.records.read().values().map(|r| r.summary()).collect();
        summaries.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stored() -> StoredUpload {
        StoredUpload {
            path: PathBuf::from("/tmp/sales.csv"),
            digest: "00".to_string(),
            byte_len: 2,
        }
    }

    fn table(rows: usize) -> CanonicalTable {
        CanonicalTable::new(
            vec!["n".to_string()],
            (0..rows as i64).map(|i| vec![Value::Integer(i)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_same_display_name_gets_distinct_ids() {
        let registry = DatasetRegistry::new();
        let a = registry.register("sales.csv", &stored(), SourceKind::Csv, &table(1)).unwrap();
        let b = registry.register("sales.csv", &stored(), SourceKind::Csv, &table(1)).unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(a.starts_with(&generate_dataset_id("sales.csv")[..8]));
    }

    #[test]
    fn test_insert_never_overwrites() {
        let registry = DatasetRegistry::new();
        let id = registry.register("a.csv", &stored(), SourceKind::Csv, &table(2)).unwrap();

        let mut clash = (*registry.lookup(&id).unwrap()).clone();
        clash.display_name = "other.csv".to_string();
        let err = registry.insert(clash).unwrap_err();

        assert!(matches!(err, PipelineError::IdentifierCollision(_)));
        assert_eq!(registry.lookup(&id).unwrap().display_name, "a.csv");
    }

    #[test]
    fn test_collision_triggers_regeneration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = DatasetRegistry::with_id_generator(Box::new(move |_| {
            // the first two calls hand out the same id
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                "fixed".to_string()
            } else {
                format!("fresh-{}", n)
            }
        }));

        let first = registry.register("a.csv", &stored(), SourceKind::Csv, &table(1)).unwrap();
        let second = registry.register("a.csv", &stored(), SourceKind::Csv, &table(1)).unwrap();

        assert_eq!(first, "fixed");
        assert_eq!(second, "fresh-2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_generator_is_internal_fault() {
        let registry = DatasetRegistry::with_id_generator(Box::new(|_| "same".to_string()));
        registry.register("a.csv", &stored(), SourceKind::Csv, &table(1)).unwrap();
        let err = registry
            .register("b.csv", &stored(), SourceKind::Csv, &table(1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[test]
    fn test_lookup_and_list() {
        let registry = DatasetRegistry::new().with_sample_rows(2);
        let id = registry.register("b.csv", &stored(), SourceKind::Csv, &table(4)).unwrap();
        registry.register("a.pdf", &stored(), SourceKind::Pdf, &table(1)).unwrap();

        let record = registry.lookup(&id).unwrap();
        assert_eq!(record.row_count, 4);
        assert_eq!(record.sample_rows.len(), 2);

        let names: Vec<String> = registry.list().into_iter().map(|s| s.display_name).collect();
        assert_eq!(names, vec!["a.pdf", "b.csv"]);

        assert!(matches!(
            registry.lookup("missing"),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_registration_is_unique() {
        let registry = Arc::new(DatasetRegistry::new());
        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = registry.clone();
                    s.spawn(move || {
                        registry
                            .register("same.csv", &stored(), SourceKind::Csv, &table(1))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 8);
        assert_eq!(registry.len(), 8);
    }
}
