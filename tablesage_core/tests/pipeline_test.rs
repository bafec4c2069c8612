use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tablesage_core::{
    Config, DatasetRegistry, ErrorKind, LanguageModel, Orchestrator, PipelineError, RawTable,
    SourceKind, TableExtractor, TextExtractor, UploadStore,
};
use tempfile::TempDir;

/// Answers with the question itself, so a test can "ask" in SQL.
struct PassthroughModel {
    calls: AtomicUsize,
}

impl PassthroughModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModel for PassthroughModel {
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        prompt
            .lines()
            .find_map(|line| line.strip_prefix("Question: "))
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("prompt has no question"))
    }
}

struct StubTables(Vec<RawTable>);

impl TableExtractor for StubTables {
    fn extract_tables(&self, _pdf: &[u8]) -> anyhow::Result<Vec<RawTable>> {
        Ok(self.0.clone())
    }
}

struct FailingTables;

impl TableExtractor for FailingTables {
    fn extract_tables(&self, _pdf: &[u8]) -> anyhow::Result<Vec<RawTable>> {
        anyhow::bail!("java not found")
    }
}

struct StubText(&'static str);

impl TextExtractor for StubText {
    fn extract_text(&self, _pdf: &[u8]) -> anyhow::Result<String> {
        Ok(self.0.to_string())
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

fn service(model: Arc<PassthroughModel>, dir: &TempDir) -> Orchestrator {
    Orchestrator::builder(Config::default())
        .model(model)
        .store(UploadStore::new(dir.path()).unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_csv_round_trip() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);

    let response = service.upload(b"a,b,c\n1,2,3\n4,5,6\n", "abc.csv").unwrap();
    assert_eq!(response.schema, vec!["a", "b", "c"]);
    assert_eq!(response.row_count, 2);
    assert_eq!(
        serde_json::to_value(&response.sample_rows).unwrap(),
        json!([{"a": 1, "b": 2, "c": 3}, {"a": 4, "b": 5, "c": 6}])
    );

    let listed = service.list_datasets();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, response.id);
    assert_eq!(listed[0].source_kind, SourceKind::Csv);
}

#[test]
fn test_boundary_shapes_are_camel_case() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);
    let upload = service.upload(b"x\n1\n", "x.csv").unwrap();

    let json = serde_json::to_value(&upload).unwrap();
    assert!(json.get("displayName").is_some());
    assert!(json.get("sampleRows").is_some());
    assert_eq!(json["sourceKind"], "csv");

    let analysis = service.analyze_dataset(&upload.id, "SELECT x FROM dataset").unwrap();
    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json["translatedQueryText"], "SELECT x FROM dataset");
    assert_eq!(json["resultRows"], json!([{"x": 1}]));
}

#[test]
fn test_duplicate_header_is_schema_error() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);

    let err = service.upload(b"a,b,a\n1,2,3\n", "dup.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    assert_eq!(err.status_code(), 422);
    assert!(service.list_datasets().is_empty());
}

#[test]
fn test_same_display_name_gets_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);

    let first = service.upload(b"v\n1\n", "same.csv").unwrap();
    let second = service.upload(b"v\n2\n", "same.csv").unwrap();
    assert_ne!(first.id, second.id);

    let a = service.analyze_dataset(&first.id, "SELECT v FROM dataset").unwrap();
    let b = service.analyze_dataset(&second.id, "SELECT v FROM dataset").unwrap();
    assert_eq!(a.result_rows[0]["v"], 1);
    assert_eq!(b.result_rows[0]["v"], 2);
}

#[test]
fn test_forced_id_collision_regenerates() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = DatasetRegistry::with_id_generator(Box::new(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            "taken".to_string()
        } else {
            format!("id-{}", n)
        }
    }));
    let service = Orchestrator::builder(Config::default())
        .registry(registry)
        .store(UploadStore::new(dir.path()).unwrap())
        .build()
        .unwrap();

    assert_eq!(service.upload(b"a\n1\n", "a.csv").unwrap().id, "taken");
    assert_eq!(service.upload(b"a\n1\n", "a.csv").unwrap().id, "id-2");
    assert_eq!(service.list_datasets().len(), 2);
}

#[test]
fn test_unknown_id_never_reaches_the_model() {
    let dir = TempDir::new().unwrap();
    let model = PassthroughModel::new();
    let service = service(model.clone(), &dir);

    let err = service
        .analyze_dataset("deadbeef-0000", "SELECT * FROM dataset")
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
    assert_eq!(model.calls(), 0);
}

#[test]
fn test_empty_question_is_invalid_request() {
    let dir = TempDir::new().unwrap();
    let model = PassthroughModel::new();
    let service = service(model.clone(), &dir);
    let id = service.upload(b"a\n1\n", "a.csv").unwrap().id;

    let err = service.analyze_dataset(&id, "   ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    let err = service.analyze_dataset("", "how many?").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(model.calls(), 0);
}

#[test]
fn test_nonexistent_column_is_query_execution_error() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);
    let id = service.upload(b"name,age\nJohn,25\n", "people.csv").unwrap().id;

    let err = service
        .analyze_dataset(&id, "SELECT salary FROM dataset")
        .unwrap_err();
    match &err {
        PipelineError::QueryExecution { query, message } => {
            assert_eq!(query, "SELECT salary FROM dataset");
            assert!(message.contains("salary"));
        }
        other => panic!("Expected QueryExecution, got {:?}", other),
    }
    assert_eq!(err.status_code(), 422);
}

#[test]
fn test_concurrent_queries_are_isolated() {
    let dir = TempDir::new().unwrap();
    let service = service(PassthroughModel::new(), &dir);
    let stock = service
        .upload(b"product,qty\nWidget A,5\nWidget B,3\n", "stock.csv")
        .unwrap()
        .id;
    let people = service
        .upload(b"name,age\nJohn,25\n", "people.csv")
        .unwrap()
        .id;

    let (good, bad) = std::thread::scope(|s| {
        let good = s.spawn(|| service.analyze_dataset(&stock, "SELECT SUM(qty) AS total FROM dataset"));
        let bad = s.spawn(|| service.analyze_dataset(&people, "SELEC age FROM"));
        (good.join().unwrap(), bad.join().unwrap())
    });

    let good = good.unwrap();
    assert_eq!(good.result_rows[0]["total"], 8);
    assert!(matches!(bad, Err(PipelineError::QueryExecution { .. })));

    let after = service
        .analyze_dataset(&people, "SELECT name FROM dataset")
        .unwrap();
    assert_eq!(after.result_rows[0]["name"], "John");
}

#[test]
fn test_unsupported_type_and_oversize() {
    let dir = TempDir::new().unwrap();
    let service = Orchestrator::builder(Config {
        max_upload_bytes: 16,
        ..Config::default()
    })
    .store(UploadStore::new(dir.path()).unwrap())
    .build()
    .unwrap();

    let err = service.upload(b"a,b\n1,2\n", "sheet.xlsx").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
    assert_eq!(err.status_code(), 400);

    let err = service.upload(&[b'a'; 17], "big.csv").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    assert_eq!(err.status_code(), 413);
}

#[test]
fn test_pdf_tables_are_merged() {
    let dir = TempDir::new().unwrap();
    let service = Orchestrator::builder(Config::default())
        .table_extractor(Arc::new(StubTables(vec![
            raw(&["x", "y"], &[&["1", "a"]]),
            raw(&["y", "z"], &[&["b", "2.5"]]),
        ])))
        .text_extractor(Arc::new(StubText("")))
        .model(PassthroughModel::new())
        .store(UploadStore::new(dir.path()).unwrap())
        .build()
        .unwrap();

    let upload = service.upload(b"%PDF-1.4", "Report.PDF").unwrap();
    assert_eq!(upload.source_kind, SourceKind::Pdf);
    assert_eq!(upload.schema, vec!["x", "y", "z"]);
    assert_eq!(upload.row_count, 2);
    assert_eq!(
        serde_json::to_value(&upload.sample_rows).unwrap(),
        json!([{"x": 1, "y": "a", "z": null}, {"x": null, "y": "b", "z": 2.5}])
    );

    let answer = service
        .analyze_dataset(&upload.id, "SELECT y FROM dataset WHERE x IS NULL")
        .unwrap();
    assert_eq!(answer.result_rows, vec![json!({"y": "b"}).as_object().unwrap().clone()]);
}

#[test]
fn test_pdf_text_fallback_and_diagnostics() {
    let dir = TempDir::new().unwrap();
    let fallback = Orchestrator::builder(Config::default())
        .table_extractor(Arc::new(StubTables(vec![])))
        .text_extractor(Arc::new(StubText("a,b,c\nd,e\n")))
        .store(UploadStore::new(dir.path()).unwrap())
        .build()
        .unwrap();

    let upload = fallback.upload(b"%PDF", "scan.pdf").unwrap();
    assert_eq!(upload.schema, vec!["Column_1", "Column_2", "Column_3"]);
    assert_eq!(upload.sample_rows[1]["Column_3"], "");

    let failing = Orchestrator::builder(Config::default())
        .table_extractor(Arc::new(FailingTables))
        .store(UploadStore::new(dir.path()).unwrap())
        .build()
        .unwrap();

    let upload = failing.upload(b"%PDF", "broken.pdf").unwrap();
    assert_eq!(upload.schema, vec!["Error"]);
    assert_eq!(
        upload.sample_rows[0]["Error"],
        "Failed to extract data: java not found"
    );
}
