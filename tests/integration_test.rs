use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, GrayImage, Luma};
use ocr_review::config::Config;
use ocr_review::correction::{CorrectionDictionary, CorrectionMethod};
use ocr_review::engine::{BoundingBox, OcrEngine, OcrResult, TextRegion};
use ocr_review::engines::EngineRegistry;
use ocr_review::error::OcrError;
use ocr_review::feedback::{FeedbackStore, NewCorrection};
use ocr_review::pipeline::{
    BatchEntry, DocumentClassifier, NoteKind, ProcessOptions, SelectedArea, SpellCorrector,
};
use ocr_review::server::{router, AppState};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const PAGE_WIDTH: u32 = 400;
const PAGE_HEIGHT: u32 = 300;
const BOUNDARY: &str = "----ocr-review-test-boundary";

/// Returns `page_text` for full pages and `area_text` for any other image size
struct StubEngine {
    page_text: String,
    area_text: String,
    confidence: f32,
}

impl StubEngine {
    fn new(page_text: &str) -> Self {
        Self {
            page_text: page_text.to_string(),
            area_text: String::new(),
            confidence: 0.9,
        }
    }

    fn with_area_text(mut self, text: &str) -> Self {
        self.area_text = text.to_string();
        self
    }
}

impl OcrEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn description(&self) -> &'static str {
        "Fixed-text engine for tests"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError> {
        let text = if image.width() == PAGE_WIDTH && image.height() == PAGE_HEIGHT {
            self.page_text.clone()
        } else {
            self.area_text.clone()
        };
        let regions = if text.is_empty() {
            Vec::new()
        } else {
            vec![TextRegion {
                text: text.clone(),
                confidence: self.confidence,
                bbox: BoundingBox::full(),
            }]
        };
        Ok(OcrResult {
            text,
            confidence: self.confidence,
            regions,
            warnings: Vec::new(),
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["rus".to_string()]
    }
}

struct FixedClassifier(f32);

impl DocumentClassifier for FixedClassifier {
    fn predict(&self, _path: &Path) -> Result<(usize, f32), OcrError> {
        Ok((1, self.0))
    }

    fn class_name(&self, index: usize) -> Option<String> {
        ["invoice", "certificate"].get(index).map(|s| s.to_string())
    }
}

struct UpperSpeller;

impl SpellCorrector for UpperSpeller {
    fn correct(&self, text: &str) -> Result<String, OcrError> {
        Ok(text.to_uppercase())
    }
}

fn checkerboard() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Luma([30])
        } else {
            Luma([220])
        }
    }))
}

fn write_page(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    checkerboard().save(&path).unwrap();
    path
}

fn state_with(
    data_dir: &Path,
    engine: StubEngine,
    configure: impl FnOnce(&mut Config),
) -> AppState {
    let mut config = Config::with_data_dir(data_dir);
    configure(&mut config);
    let engines = EngineRegistry::from_engines(vec![Arc::new(engine)]).unwrap();
    AppState::new(config, engines).unwrap()
}

fn state(data_dir: &Path, engine: StubEngine) -> AppState {
    state_with(data_dir, engine, |_| {})
}

fn multipart_body(file_name: &str, file: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
            BOUNDARY, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(b"\r\n");
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

// ============================================================================
// Pipeline
// ============================================================================

#[test]
fn test_process_corrects_validates_and_records_feedback() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new("ИНН 7707083893 0ксида МАРК0"));
    let path = write_page(dir.path(), "scan.png");

    let options = ProcessOptions {
        required_fields: Some(vec!["inn".to_string()]),
        ..ProcessOptions::default()
    };
    let result = state.pipeline.process(&path, &options).unwrap();

    assert!(result.document_id.starts_with("scan.png_"));
    assert_eq!(result.extracted_data.total_pages, 1);
    assert_eq!(result.extracted_data.raw_text, "ИНН 7707083893 0ксида МАРК0");
    assert_eq!(result.extracted_data.full_text, "ИНН 7707083893 оксида МАРКО");

    let inn = &result.extracted_data.critical_fields["inn"];
    assert!(inn.valid);
    assert_eq!(inn.value, "7707083893");

    let digit_rules: Vec<_> = result
        .corrections_applied
        .iter()
        .filter(|c| c.method == CorrectionMethod::ContextualDigitRule)
        .map(|c| (c.from.as_str(), c.to.as_str()))
        .collect();
    assert_eq!(digit_rules, vec![("0ксида", "оксида"), ("МАРК0", "МАРКО")]);

    let stats = state.learning.store().statistics();
    assert_eq!(
        stats.summary.corrections_count,
        result.corrections_applied.len() as u64
    );
    state.learning.store().with_log(|log| {
        assert!(log
            .corrections
            .iter()
            .all(|c| c.document_id == result.document_id && c.context.is_some()));
    });
}

#[test]
fn test_process_puts_selected_areas_first() {
    let dir = TempDir::new().unwrap();
    let engine = StubEngine::new("основной текст").with_area_text("КПП 770801001");
    let state = state(dir.path(), engine);
    let path = write_page(dir.path(), "areas.png");

    let area = SelectedArea {
        page: 1,
        x1: 10.0,
        y1: 10.0,
        x2: 110.0,
        y2: 60.0,
    };
    let options = ProcessOptions {
        selected_areas: vec![area],
        required_fields: Some(vec!["kpp".to_string()]),
        ..ProcessOptions::default()
    };
    let result = state.pipeline.process(&path, &options).unwrap();

    let areas = &result.extracted_data.selected_areas;
    assert_eq!(areas.len(), 1);
    assert_eq!(areas[0].area_number, 1);
    assert_eq!(areas[0].dpi, 900);
    assert_eq!(areas[0].coordinates, area);

    let text = &result.extracted_data.full_text;
    let area_at = text.find("[Area 1]: КПП 770801001").unwrap();
    let body_at = text.find("основной текст").unwrap();
    assert!(area_at < body_at);
    assert!(result.extracted_data.critical_fields["kpp"].valid);
}

#[test]
fn test_area_outside_page_is_skipped() {
    let dir = TempDir::new().unwrap();
    let engine = StubEngine::new("текст страницы").with_area_text("не должно появиться");
    let state = state(dir.path(), engine);
    let path = write_page(dir.path(), "outside.png");

    let options = ProcessOptions {
        selected_areas: vec![SelectedArea {
            page: 1,
            x1: 5000.0,
            y1: 5000.0,
            x2: 6000.0,
            y2: 6000.0,
        }],
        ..ProcessOptions::default()
    };
    let result = state.pipeline.process(&path, &options).unwrap();

    assert!(result.extracted_data.selected_areas.is_empty());
    assert_eq!(result.extracted_data.full_text, "текст страницы");
}

#[test]
fn test_empty_recognition_is_an_error() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new(""));
    let path = write_page(dir.path(), "blank.png");

    let error = state
        .pipeline
        .process(&path, &ProcessOptions::default())
        .unwrap_err();
    assert!(matches!(error, OcrError::EmptyRecognition(_)));
}

#[test]
fn test_invalid_field_forces_review() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new("документ без реквизитов"));
    let path = write_page(dir.path(), "plain.png");

    let options = ProcessOptions {
        required_fields: Some(vec!["ogrn".to_string()]),
        ..ProcessOptions::default()
    };
    let result = state.pipeline.process(&path, &options).unwrap();

    assert!(!result.extracted_data.critical_fields["ogrn"].valid);
    assert!(result.needs_review);
    assert_eq!(result.review_notes.errors.len(), 1);
    assert_eq!(result.review_notes.errors[0].fields, vec!["ogrn".to_string()]);
}

#[test]
fn test_classifier_only_used_without_template() {
    let dir = TempDir::new().unwrap();
    let path = write_page(dir.path(), "typed.png");

    let confident = {
        let state = state(dir.path(), StubEngine::new("текст"));
        Arc::try_unwrap(state.pipeline)
            .ok()
            .unwrap()
            .with_classifier(Arc::new(FixedClassifier(0.9)))
    };
    let detected = confident.process(&path, &ProcessOptions::default()).unwrap();
    assert_eq!(detected.template.as_deref(), Some("certificate"));

    let supplied = confident
        .process(
            &path,
            &ProcessOptions {
                template: Some("contract".to_string()),
                ..ProcessOptions::default()
            },
        )
        .unwrap();
    assert_eq!(supplied.template.as_deref(), Some("contract"));

    let unsure = {
        let state = state(dir.path(), StubEngine::new("текст"));
        Arc::try_unwrap(state.pipeline)
            .ok()
            .unwrap()
            .with_classifier(Arc::new(FixedClassifier(0.5)))
    };
    let undetected = unsure.process(&path, &ProcessOptions::default()).unwrap();
    assert_eq!(undetected.template, None);
}

#[test]
fn test_spell_corrections_are_not_recorded_as_feedback() {
    let dir = TempDir::new().unwrap();
    let path = write_page(dir.path(), "spell.png");
    let state = state(dir.path(), StubEngine::new("мама мыла раму и папа читал газету"));
    let store = Arc::clone(state.learning.store());
    let pipeline = Arc::try_unwrap(state.pipeline)
        .ok()
        .unwrap()
        .with_spell_corrector(Arc::new(UpperSpeller));

    let result = pipeline.process(&path, &ProcessOptions::default()).unwrap();

    assert_eq!(result.extracted_data.full_text, "МАМА МЫЛА РАМУ И ПАПА ЧИТАЛ ГАЗЕТУ");
    assert_eq!(result.corrections_applied.len(), 1);
    assert_eq!(
        result.corrections_applied[0].method,
        CorrectionMethod::NeuralSpelling
    );
    assert_eq!(store.statistics().summary.corrections_count, 0);
}

#[test]
fn test_render_text_summary() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new("ИНН 7707083893"));
    let path = write_page(dir.path(), "summary.png");

    let options = ProcessOptions {
        required_fields: Some(vec!["inn".to_string()]),
        ..ProcessOptions::default()
    };
    let result = state.pipeline.process(&path, &options).unwrap();
    let text = result.render_text();

    assert!(text.starts_with(&format!("Document ID: {}\n", result.document_id)));
    assert!(text.contains("Quality: "));
    assert!(text.contains("\nCritical Fields:\n  inn: 7707083893 (valid: true)\n"));
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_records_failures_and_continues() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new("ИНН 7707083893"));
    let good = write_page(dir.path(), "good.png");
    let missing = dir.path().join("missing.png");

    let report = state
        .pipeline
        .batch_process(&[missing.clone(), good], None);

    assert_eq!(report.total_processed, 2);
    assert_eq!(report.successful, 1);
    match &report.documents[0] {
        BatchEntry::Failed(failed) => {
            assert!(failed.document_id.starts_with("error_"));
            assert_eq!(failed.file_path, missing);
            assert!(!failed.success);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(report.documents[1].is_success());
}

#[test]
fn test_batch_suggests_unanimous_low_confidence_corrections() {
    let dir = TempDir::new().unwrap();
    let state = state_with(dir.path(), StubEngine::new("раствор 0ксида"), |config| {
        config.correction.digit_rule_confidence = 0.75;
    });
    let files = vec![
        write_page(dir.path(), "one.png"),
        write_page(dir.path(), "two.png"),
    ];

    let report = state.pipeline.batch_process(&files, Some("certificate"));

    assert_eq!(report.successful, 2);
    assert!(report.needs_human_review);
    assert_eq!(report.new_corrections_suggested.len(), 1);

    let suggestion = &report.new_corrections_suggested[0];
    assert_eq!(suggestion.from, "0ксида");
    assert_eq!(suggestion.to, "оксида");
    assert_eq!(suggestion.occurrences, 2);
    assert!((suggestion.confidence - 0.7).abs() < f32::EPSILON);

    for entry in &report.documents {
        let BatchEntry::Processed(result) = entry else {
            panic!("expected processed document, got {:?}", entry);
        };
        assert_eq!(result.new_corrections_suggested, report.new_corrections_suggested);
        let note = result
            .review_notes
            .suggestions
            .iter()
            .find(|n| n.kind == NoteKind::NewCorrections)
            .unwrap();
        assert_eq!(note.count, Some(1));
    }
}

#[test]
fn test_batch_without_low_confidence_corrections_suggests_nothing() {
    let dir = TempDir::new().unwrap();
    let state = state(dir.path(), StubEngine::new("раствор 0ксида"));
    let files = vec![write_page(dir.path(), "one.png")];

    let report = state.pipeline.batch_process(&files, None);

    assert!(report.new_corrections_suggested.is_empty());
    assert!(!report.needs_human_review);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_concurrent_writers_lose_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;

    let dir = TempDir::new().unwrap();
    let feedback_path = dir.path().join("feedback.json");
    let dictionary_path = dir.path().join("corrections.json");
    let store = FeedbackStore::open(&feedback_path);
    let dictionary = CorrectionDictionary::open(&dictionary_path);
    let seeded = dictionary.len();

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let (store, dictionary) = (&store, &dictionary);
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    let original = format!("слов{}_{}", t, i);
                    let corrected = format!("слово{}_{}", t, i);
                    store
                        .add_correction(NewCorrection {
                            original: original.clone(),
                            corrected: corrected.clone(),
                            document_id: format!("doc_{}", t),
                            context: None,
                            user_id: None,
                            confidence: 0.9,
                        })
                        .unwrap();
                    assert!(dictionary.learn(&original, &corrected));
                }
            });
        }
    });

    let store = FeedbackStore::open(&feedback_path);
    let dictionary = CorrectionDictionary::open(&dictionary_path);

    assert_eq!(store.snapshot().corrections.len(), THREADS * PER_THREAD);
    assert_eq!(dictionary.len(), seeded + THREADS * PER_THREAD);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            assert_eq!(
                dictionary.get(&format!("слов{}_{}", t, i)),
                Some(format!("слово{}_{}", t, i))
            );
        }
    }
}

// ============================================================================
// HTTP surface
// ============================================================================

#[tokio::test]
async fn test_health_and_info() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("текст")));

    let (status, health) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, info) = send(&app, get("/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["default_engine"], "stub");
    assert_eq!(info["available_engines"][0]["name"], "stub");
    assert_eq!(info["corrections_db_size"], 1);
    assert!(info["fields"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["name"] == "inn"));
}

#[tokio::test]
async fn test_process_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("ИНН 7707083893")));

    let mut png = Vec::new();
    checkerboard()
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let body = multipart_body(
        "upload.png",
        &png,
        &[
            ("required_fields", "inn, kpp"),
            ("selected_areas", "[]"),
            ("template", "certificate"),
        ],
    );
    let (status, result) = send(&app, multipart_request("/process", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(result["document_id"]
        .as_str()
        .unwrap()
        .starts_with("upload.png_"));
    assert_eq!(result["file_type"], "image");
    assert_eq!(result["template"], "certificate");
    assert_eq!(result["extracted_data"]["critical_fields"]["inn"]["valid"], true);
    assert_eq!(result["extracted_data"]["critical_fields"]["kpp"]["valid"], false);
    assert_eq!(result["needs_review"], true);
}

#[tokio::test]
async fn test_process_endpoint_rejects_bad_requests() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("текст")));

    let body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"template\"\r\n\r\ncertificate\r\n--{}--\r\n",
        BOUNDARY, BOUNDARY
    );
    let (status, error) = send(&app, multipart_request("/process", body.into_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "MISSING_FILE");

    let body = multipart_body("upload.png", b"png", &[("selected_areas", "not json")]);
    let (status, error) = send(&app, multipart_request("/process", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_feedback_promotes_after_two_documents() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("текст")));

    let feedback = |document_id: &str| {
        json!({
            "original": "Прнказ",
            "corrected": "Приказ",
            "document_id": document_id,
            "confidence": 0.9
        })
    };

    let (status, first) = send(
        &app,
        json_request("POST", "/feedback/correction", feedback("doc_1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["promoted"], 0);
    assert!(first["feedback_id"].as_str().unwrap().starts_with("feedback_"));

    let (_, db) = send(&app, get("/corrections_db")).await;
    assert!(db["corrections"].get("Прнказ").is_none());

    let (_, second) = send(
        &app,
        json_request("POST", "/feedback/correction", feedback("doc_2")),
    )
    .await;
    assert_eq!(second["promoted"], 1);

    let (_, db) = send(&app, get("/corrections_db")).await;
    assert_eq!(db["corrections"]["Прнказ"], "Приказ");
    assert_eq!(db["total_count"], 2);

    let (_, stats) = send(&app, get("/feedback/statistics")).await;
    assert_eq!(stats["feedback_statistics"]["applied_corrections"], 2);
    assert_eq!(stats["feedback_statistics"]["pending_corrections"], 0);
    assert_eq!(stats["corrections_db_size"], 2);
}

#[tokio::test]
async fn test_quality_and_document_type_feedback() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("текст")));

    let (status, outcome) = send(
        &app,
        json_request(
            "POST",
            "/feedback/quality",
            json!({"document_id": "doc_1", "rating": 0.4, "issues": ["blur"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(outcome["feedback_id"].as_str().unwrap().starts_with("quality_"));

    let (status, outcome) = send(
        &app,
        json_request(
            "POST",
            "/feedback/document_type",
            json!({
                "document_id": "doc_1",
                "predicted_type": "invoice",
                "actual_type": "certificate"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["document_types_learned"][0], "certificate");

    let (_, patterns) = send(&app, get("/feedback/patterns")).await;
    assert_eq!(patterns["document_type_accuracy"]["invoice"]["total"], 1);
    assert_eq!(patterns["document_type_accuracy"]["invoice"]["correct"], 0);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/feedback/quality",
            json!({"document_id": "doc_1", "rating": 3.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_correction_and_export() {
    let dir = TempDir::new().unwrap();
    let app = router(state(dir.path(), StubEngine::new("текст")));

    let (status, confirmed) = send(
        &app,
        json_request(
            "POST",
            "/confirm_correction",
            json!({"original": "0бщество", "corrected": "Общество"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["success"], true);
    assert!(confirmed["correction_id"].as_str().unwrap().starts_with("corr_"));

    let (_, db) = send(&app, get("/corrections_db")).await;
    assert_eq!(db["corrections"]["0бщество"], "Общество");

    send(
        &app,
        json_request(
            "POST",
            "/feedback/correction",
            json!({"original": "Дoгoвoр", "corrected": "Договор", "document_id": "doc_9"}),
        ),
    )
    .await;

    let (status, export) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/feedback/export")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let path = PathBuf::from(export["path"].as_str().unwrap());
    let exported: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(exported["corrections"].as_array().unwrap().len(), 1);
    assert_eq!(exported["corrections"][0]["corrected"], "Договор");
}

#[tokio::test]
async fn test_auto_update_endpoint_respects_thresholds() {
    let dir = TempDir::new().unwrap();
    let state = state_with(dir.path(), StubEngine::new("текст"), |config| {
        config.learning.auto_update_enabled = false;
    });
    let app = router(state);

    for document_id in ["doc_1", "doc_2"] {
        send(
            &app,
            json_request(
                "POST",
                "/feedback/correction",
                json!({
                    "original": "Сввдетельство",
                    "corrected": "Свидетельство",
                    "document_id": document_id,
                    "confidence": 0.8
                }),
            ),
        )
        .await;
    }
    send(
        &app,
        json_request(
            "POST",
            "/feedback/correction",
            json!({
                "original": "Рег",
                "corrected": "Per",
                "document_id": "doc_3",
                "confidence": 0.2
            }),
        ),
    )
    .await;

    let (_, db) = send(&app, get("/corrections_db")).await;
    assert!(db["corrections"].get("Сввдетельство").is_none());

    let (status, report) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/feedback/auto_update")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["promoted"].as_array().unwrap().len(), 1);
    assert_eq!(report["promoted"][0]["original"], "Сввдетельство");
    assert_eq!(report["marked_applied"], 2);

    let (_, db) = send(&app, get("/corrections_db")).await;
    assert_eq!(db["corrections"]["Сввдетельство"], "Свидетельство");
    assert!(db["corrections"].get("Рег").is_none());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let app = router(state(dir.path(), StubEngine::new("текст")));
        send(
            &app,
            json_request(
                "POST",
                "/confirm_correction",
                json!({"original": "Москвв", "corrected": "Москва"}),
            ),
        )
        .await;
        send(
            &app,
            json_request(
                "POST",
                "/feedback/quality",
                json!({"document_id": "doc_1", "rating": 0.9}),
            ),
        )
        .await;
    }

    let app = router(state(dir.path(), StubEngine::new("текст")));
    let (_, db) = send(&app, get("/corrections_db")).await;
    assert_eq!(db["corrections"]["Москвв"], "Москва");

    let (_, stats) = send(&app, get("/feedback/statistics")).await;
    assert_eq!(stats["feedback_statistics"]["total_feedback"], 1);
    assert_eq!(stats["feedback_statistics"]["quality_ratings_count"], 1);
}
