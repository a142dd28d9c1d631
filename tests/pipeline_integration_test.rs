use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};
use sheet_classify::core::orchestrator::RunState;
use sheet_classify::core::taxonomy::Taxonomy;
use sheet_classify::domain::model::{ClassificationRequest, FilterState, SortDirection, SortSpec};
use sheet_classify::domain::ports::{Classifier, Sleeper};
use sheet_classify::{
    ClassificationEngine, ClassifyError, CsvWorkbook, GeminiClassifier, GeminiSettings,
    LocalStorage, PipelineOrchestrator, Result, RetryingBatchRunner, ZipTableWriter,
};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct NoSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Answers every batch with one label per entry, except batches starting at `fail_from`.
struct LabelAll {
    label: &'static str,
    fail_from: Option<usize>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Classifier for LabelAll {
    async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if batch.first().map(|r| r.id) == self.fail_from {
            return Err(ClassifyError::ServiceError {
                message: "HTTP 503: overloaded".to_string(),
            });
        }
        Ok(Value::Array(
            batch
                .iter()
                .map(|_| json!({ "category": self.label }))
                .collect(),
        ))
    }
}

fn gemini(base_url: String) -> GeminiClassifier {
    let settings = GeminiSettings {
        base_url,
        api_key: Some("test-key".to_string()),
        ..GeminiSettings::default()
    };
    GeminiClassifier::new(settings, Taxonomy::default()).unwrap()
}

fn generated(text: &str) -> Value {
    json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    })
}

fn purchases_csv() -> &'static str {
    "Наименование;Регион;Стоимость\nServer;Москва;120 руб.\nLegal advice;Казань;80 руб.\n;Казань;10\n"
}

#[tokio::test]
async fn test_classify_sheet_through_gemini_and_export_zip() {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-1.5-flash:generateContent")
            .header("x-goog-api-key", "test-key")
            .body_contains("Legal advice");
        then.status(200).json_body(generated(
            r#"[{"category":"инф.структура"},{"category":"услуги (прочее)"}]"#,
        ));
    });

    let workbook = CsvWorkbook::from_csv("Закупки", purchases_csv().as_bytes()).unwrap();
    let runner = RetryingBatchRunner::new(gemini(server.base_url()), NoSleep::default());
    let mut engine =
        ClassificationEngine::new(workbook, "purchases", PipelineOrchestrator::new(runner, 150));

    assert_eq!(engine.open().unwrap().as_deref(), Some("Закупки"));
    assert_eq!(engine.select_column("Наименование").unwrap(), 3);

    let summary = engine.classify().await.unwrap();
    api_mock.assert_hits(1);
    assert!(summary.is_completed());
    assert_eq!(summary.total_batches, 1);
    assert_eq!(summary.classified, 2);

    let categories: Vec<(usize, &str)> = engine
        .rows()
        .iter()
        .map(|row| (row.id, row.category.as_str()))
        .collect();
    assert_eq!(
        categories,
        vec![(1, "инф.структура"), (2, "услуги (прочее)"), (3, "")]
    );
    assert_eq!(
        engine.semantic_columns().cost.as_deref(),
        Some("Стоимость")
    );

    engine.set_sort(SortSpec::by("Стоимость", SortDirection::Descending));
    let dir = TempDir::new().unwrap();
    let output_path = dir.path().to_str().unwrap().to_string();
    let writer = ZipTableWriter::new(LocalStorage::new(&output_path), &output_path);
    let written = engine.export(&writer).await.unwrap();
    assert!(written.ends_with("categorized_purchases.zip"));

    let zip_data = std::fs::read(dir.path().join("categorized_purchases.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
    let mut csv_content = String::new();
    archive
        .by_name("categorized.csv")
        .unwrap()
        .read_to_string(&mut csv_content)
        .unwrap();
    let lines: Vec<&str> = csv_content.lines().collect();
    assert_eq!(lines[0], "Наименование,Регион,Стоимость,category");
    assert_eq!(lines[1], "Server,Москва,120 руб.,инф.структура");
    assert_eq!(lines.len(), 4);
    assert!(archive.by_name("cell_metadata.json").is_ok());
}

#[tokio::test]
async fn test_permanent_batch_failure_aborts_and_keeps_earlier_results() {
    let csv: String = std::iter::once("Наименование".to_string())
        .chain((1..=250).map(|i| format!("item {}", i)))
        .collect::<Vec<_>>()
        .join("\n");
    let workbook = CsvWorkbook::from_csv("Закупки", csv.as_bytes()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let sleeper = NoSleep::default();
    let classifier = LabelAll {
        label: "оборудование",
        fail_from: Some(101),
        calls: calls.clone(),
    };
    let runner = RetryingBatchRunner::new(classifier, sleeper.clone());
    let mut engine =
        ClassificationEngine::new(workbook, "purchases", PipelineOrchestrator::new(runner, 100));
    engine.open().unwrap();
    engine.select_column("Наименование").unwrap();

    let summary = engine.classify().await.unwrap();

    assert_eq!(
        summary.state,
        RunState::Aborted {
            batch_index: 2,
            attempts: 3
        }
    );
    assert_eq!(summary.total_batches, 3);
    assert_eq!(summary.processed_batches, 1);
    assert_eq!(summary.classified, 100);
    // one call for batch 1, three for batch 2, none for batch 3
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        *sleeper.delays.lock().unwrap(),
        vec![Duration::from_millis(2000), Duration::from_millis(4000)]
    );

    assert_eq!(engine.errors(), ["Batch 2 failed after 3 attempts."]);
    assert!(engine.rows()[..100].iter().all(|row| row.is_classified()));
    assert!(engine.rows()[100..].iter().all(|row| !row.is_classified()));
    assert!(matches!(
        summary.error(),
        Some(ClassifyError::BatchFailedError { batch_index: 2, .. })
    ));
}

#[tokio::test]
async fn test_min_cost_filter_on_classified_rows() {
    let csv = "Наименование;Стоимость\nA item;120 руб.\nB item;80 руб.\n";
    let workbook = CsvWorkbook::from_csv("Закупки", csv.as_bytes()).unwrap();

    struct ByPrefix;

    #[async_trait]
    impl Classifier for ByPrefix {
        async fn classify(&self, batch: &[ClassificationRequest]) -> Result<Value> {
            Ok(Value::Array(
                batch
                    .iter()
                    .map(|r| json!({ "id": r.id, "category": &r.value[..1] }))
                    .collect(),
            ))
        }
    }

    let runner = RetryingBatchRunner::new(ByPrefix, NoSleep::default())
        .with_taxonomy(Taxonomy::new(
            vec!["A".to_string(), "B".to_string()],
            "other".to_string(),
        ));
    let mut engine =
        ClassificationEngine::new(workbook, "purchases", PipelineOrchestrator::new(runner, 150));
    engine.open().unwrap();
    engine.select_column("Наименование").unwrap();
    engine.classify().await.unwrap();

    engine.set_filters(FilterState::new().with_category("A").with_min_cost("A", 100.0));
    let visible: Vec<&str> = engine.view().iter().map(|row| row.value.as_str()).collect();
    assert_eq!(visible, vec!["A item"]);

    engine.set_filters(FilterState::new().with_category("A").with_min_cost("A", 150.0));
    assert!(engine.view().is_empty());

    engine.filters_mut().clear();
    assert_eq!(engine.view().len(), 2);
}

#[tokio::test]
async fn test_zip_workbook_links_reach_export_metadata() -> anyhow::Result<()> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("Закупки.csv", options)?;
        writer.write_all("Наименование,Стоимость\nServer,120\nCable,5\n".as_bytes())?;
        writer.start_file("links.json", options)?;
        let links = json!([{ "sheet": "Закупки", "row": 1, "column": "Наименование", "uri": "https://example.com/cable" }]);
        writer.write_all(links.to_string().as_bytes())?;
        writer.finish()?;
    }
    let workbook = CsvWorkbook::from_zip(buffer.into_inner())?;

    let runner = RetryingBatchRunner::new(
        LabelAll {
            label: "телеком",
            fail_from: None,
            calls: Arc::new(AtomicUsize::new(0)),
        },
        NoSleep::default(),
    );
    let mut engine =
        ClassificationEngine::new(workbook, "book", PipelineOrchestrator::new(runner, 150));
    engine.open()?;
    engine.select_column("Наименование")?;
    tokio_test::assert_ok!(engine.classify().await);

    let table = engine.export_table()?;
    assert_eq!(table.name, "categorized_book");
    let link = table.metadata_for(1, "Наименование").unwrap();
    assert_eq!(link.hyperlink.as_deref(), Some("https://example.com/cable"));
    let fill = table.metadata_for(0, "category").unwrap();
    assert_eq!(fill.fill_color.as_deref(), Some("#cffafe"));
    Ok(())
}
