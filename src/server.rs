use crate::config::Config;
use crate::correction::CorrectionDictionary;
use crate::engines::{EngineInfo, EngineRegistry};
use crate::error::OcrError;
use crate::feedback::{
    FeedbackPayload, FeedbackStore, NewCorrection, NewDocumentType, NewQualityRating,
};
use crate::learning::{
    ActiveLearningController, DictionaryView, FeedbackOutcome, LearningStatistics,
    PatternAnalysis, PromotionReport,
};
use crate::pipeline::{BatchReport, DocumentPipeline, ProcessOptions, SelectedArea};
use crate::validation::FieldInfo;
use axum::{
    body::Bytes,
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub learning: Arc<ActiveLearningController>,
    pub engines: Arc<Vec<EngineInfo>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the durable stores and wire the pipeline to the default engine
    pub fn new(config: Config, engines: EngineRegistry) -> Result<Self, OcrError> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let dictionary = Arc::new(CorrectionDictionary::open(&config.storage.corrections_path));
        let store = Arc::new(FeedbackStore::open(&config.storage.feedback_path));

        let pipeline = DocumentPipeline::new(
            engines.default_engine(),
            Arc::clone(&dictionary),
            Some(Arc::clone(&store)),
            &config,
        )?;
        let learning = ActiveLearningController::new(
            store,
            dictionary,
            config.learning.clone(),
            &config.storage.export_path,
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            learning: Arc::new(learning),
            engines: Arc::new(engines.info()),
            config: Arc::new(config),
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub default_engine: String,
    pub available_engines: Vec<EngineInfo>,
    pub supported_formats: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub corrections_db_size: usize,
    pub max_file_size_bytes: usize,
    pub default_language: String,
}

fn add_to_db_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "add_to_db_default")]
    pub add_to_db: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub correction_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub path: PathBuf,
}

/// Build the router over `state`
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/process", post(handle_process))
        .route("/batch_process", post(handle_batch_process))
        .route("/confirm_correction", post(handle_confirm_correction))
        .route("/corrections_db", get(handle_corrections_db))
        .route("/feedback/correction", post(handle_correction_feedback))
        .route("/feedback/quality", post(handle_quality_feedback))
        .route("/feedback/document_type", post(handle_document_type_feedback))
        .route("/feedback/statistics", get(handle_statistics))
        .route("/feedback/patterns", get(handle_patterns))
        .route("/feedback/auto_update", post(handle_auto_update))
        .route("/feedback/export", post(handle_export))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let engines = EngineRegistry::new(&config)?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState::new(config, engines)?;
    tracing::info!(
        "Loaded {} dictionary entries, default engine: {}",
        state.learning.dictionary().len(),
        state.pipeline.engine().name()
    );

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Run blocking work (recognition, store I/O) off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, OcrError>
where
    F: FnOnce() -> Result<T, OcrError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| OcrError::Internal(format!("Worker task failed: {}", e)))?
}

/// An uploaded file stored under its own name in a private temp directory
struct Upload {
    _dir: TempDir,
    path: PathBuf,
}

impl Upload {
    fn store(
        data: &[u8],
        file_name: Option<&str>,
        content_type: Option<&str>,
        max_size: usize,
    ) -> Result<Self, OcrError> {
        if data.len() > max_size {
            return Err(OcrError::ImageTooLarge {
                size: data.len(),
                max: max_size,
            });
        }

        let name = file_name
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| Path::new(n).extension().is_some())
            .unwrap_or_else(|| format!("upload{}", extension_for(content_type)));

        let dir = tempfile::tempdir()
            .map_err(|e| OcrError::Internal(format!("Failed to create temp dir: {}", e)))?;
        let path = dir.path().join(name);
        std::fs::write(&path, data)
            .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {}", e)))?;

        Ok(Self { _dir: dir, path })
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type.unwrap_or("application/octet-stream") {
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        "image/webp" => ".webp",
        "image/tiff" => ".tiff",
        "application/pdf" => ".pdf",
        _ => ".tmp",
    }
}

struct FilePart {
    data: Bytes,
    file_name: Option<String>,
    content_type: Option<String>,
}

async fn read_file(field: Field<'_>) -> Result<FilePart, OcrError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to read file data: {}", e)))?;
    Ok(FilePart {
        data,
        file_name,
        content_type,
    })
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, OcrError> {
    field
        .text()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Invalid {}: {}", name, e)))
}

fn optional(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Handle single document processing
async fn handle_process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, OcrError> {
    let start = Instant::now();

    let mut file: Option<FilePart> = None;
    let mut options = ProcessOptions::default();
    let mut as_text = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => file = Some(read_file(field).await?),
            "template" => options.template = optional(read_text(field, "template").await?),
            "required_fields" => {
                let fields: Vec<String> = read_text(field, "required_fields")
                    .await?
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
                options.required_fields = (!fields.is_empty()).then_some(fields);
            }
            "selected_areas" => {
                let raw = read_text(field, "selected_areas").await?;
                if !raw.trim().is_empty() {
                    options.selected_areas = serde_json::from_str::<Vec<SelectedArea>>(&raw)
                        .map_err(|e| {
                            OcrError::InvalidRequest(format!("Invalid selected_areas: {}", e))
                        })?;
                }
            }
            "format" => as_text = read_text(field, "format").await?.trim() == "text",
            _ => {}
        }
    }

    let file = file.ok_or(OcrError::MissingFile)?;
    let upload = Upload::store(
        &file.data,
        file.file_name.as_deref(),
        file.content_type.as_deref(),
        state.config.max_file_size,
    )?;

    let pipeline = Arc::clone(&state.pipeline);
    let result = blocking(move || pipeline.process(&upload.path, &options)).await?;

    tracing::info!(
        "Processed {} in {}ms",
        result.document_id,
        start.elapsed().as_millis()
    );

    if as_text {
        return Ok(result.render_text().into_response());
    }
    Ok(Json(result).into_response())
}

/// Handle batch processing of every `files` part
async fn handle_batch_process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, OcrError> {
    let mut uploads = Vec::new();
    let mut template = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "files" | "file" => {
                let part = read_file(field).await?;
                uploads.push(Upload::store(
                    &part.data,
                    part.file_name.as_deref(),
                    part.content_type.as_deref(),
                    state.config.max_file_size,
                )?);
            }
            "template" => template = optional(read_text(field, "template").await?),
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(OcrError::MissingFile);
    }

    let pipeline = Arc::clone(&state.pipeline);
    let report = blocking(move || {
        let paths: Vec<PathBuf> = uploads.iter().map(|u| u.path.clone()).collect();
        Ok(pipeline.batch_process(&paths, template.as_deref()))
    })
    .await?;

    Ok(Json(report))
}

async fn handle_confirm_correction(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, OcrError> {
    if let Some(context) = &request.context {
        tracing::debug!("Confirming correction in context: {}", context);
    }

    let learning = Arc::clone(&state.learning);
    let original = request.original.clone();
    let corrected = request.corrected.clone();
    let confirmed = blocking(move || {
        learning.confirm_correction(&request.original, &request.corrected, request.add_to_db)
    })
    .await?;

    let message = if confirmed.added_to_db {
        format!("Correction '{}' -> '{}' added to the dictionary", original, corrected)
    } else {
        format!("Correction '{}' -> '{}' recorded", original, corrected)
    };

    Ok(Json(ConfirmResponse {
        success: true,
        message,
        correction_id: confirmed.correction_id,
    }))
}

async fn handle_corrections_db(
    State(state): State<AppState>,
) -> Result<Json<DictionaryView>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let view = blocking(move || Ok(learning.dictionary_view())).await?;
    Ok(Json(view))
}

async fn submit_feedback(
    state: AppState,
    payload: FeedbackPayload,
) -> Result<Json<FeedbackOutcome>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let outcome = blocking(move || learning.process_feedback(payload)).await?;
    Ok(Json(outcome))
}

async fn handle_correction_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<NewCorrection>,
) -> Result<Json<FeedbackOutcome>, OcrError> {
    submit_feedback(state, FeedbackPayload::Correction(feedback)).await
}

async fn handle_quality_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<NewQualityRating>,
) -> Result<Json<FeedbackOutcome>, OcrError> {
    submit_feedback(state, FeedbackPayload::Quality(feedback)).await
}

async fn handle_document_type_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<NewDocumentType>,
) -> Result<Json<FeedbackOutcome>, OcrError> {
    submit_feedback(state, FeedbackPayload::DocumentType(feedback)).await
}

async fn handle_statistics(
    State(state): State<AppState>,
) -> Result<Json<LearningStatistics>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let statistics = blocking(move || Ok(learning.statistics())).await?;
    Ok(Json(statistics))
}

async fn handle_patterns(
    State(state): State<AppState>,
) -> Result<Json<PatternAnalysis>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let patterns = blocking(move || Ok(learning.analyze_patterns())).await?;
    Ok(Json(patterns))
}

async fn handle_auto_update(
    State(state): State<AppState>,
) -> Result<Json<PromotionReport>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let report = blocking(move || Ok(learning.auto_update())).await?;
    Ok(Json(report))
}

async fn handle_export(State(state): State<AppState>) -> Result<Json<ExportResponse>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let path = blocking(move || learning.export_training_data(None)).await?;
    Ok(Json(ExportResponse {
        success: true,
        path,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> Result<Json<InfoResponse>, OcrError> {
    let learning = Arc::clone(&state.learning);
    let corrections_db_size = blocking(move || Ok(learning.dictionary().len())).await?;

    Ok(Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_engine: state.pipeline.engine().name().to_string(),
        available_engines: (*state.engines).clone(),
        supported_formats: ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp", "pdf"]
            .iter()
            .map(|f| f.to_string())
            .collect(),
        fields: state.pipeline.validator().fields(),
        corrections_db_size,
        max_file_size_bytes: state.config.max_file_size,
        default_language: state.config.default_language.clone(),
    }))
}
