//! HTTP Server for the knowledge-base import API.
//!
//! # API Endpoints
//!
//! | Method | Path                 | Description                              |
//! |--------|----------------------|------------------------------------------|
//! | GET    | `/health`            | Health check                             |
//! | GET    | `/api/template`      | Download the CSV template                |
//! | POST   | `/api/preview`       | Parse, map and validate an upload        |
//! | POST   | `/api/import`        | Import an upload into the knowledge base |
//! | POST   | `/api/import/cancel` | Cancel the running import                |
//! | GET    | `/api/documents`     | List stored documents                    |
//! | GET    | `/api/export`        | Download stored documents as CSV         |
//! | GET    | `/api/logs`          | SSE stream for real-time logs            |
//!
//! Upload endpoints take `multipart/form-data` with a `file` part and
//! optional `mapping` (JSON), `settings` (JSON) and `dryRun` parts.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ImportResponse, PreviewResponse, UploadOptions};
use crate::cache::MappingRegistry;
use crate::config::Config;
use crate::error::{ImportError, PipelineError, ServerError, ServerResult, WizardError};
use crate::export::{export_csv, template_csv, TEMPLATE_FILE_NAME};
use crate::import::executor::{CancelToken, ImportExecutor, ImportLock};
use crate::import::pipeline::{preview, run_import, ImportRequest};
use crate::mapping::ColumnMapping;
use crate::models::KnowledgeDocument;
use crate::store::DocumentStore;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<DocumentStore>>,
    registry: Arc<Mutex<MappingRegistry>>,
    executor: ImportExecutor,
    /// Held for the whole of an import request
    import_lock: ImportLock,
    /// Token of the running import, if any
    running: Arc<Mutex<Option<CancelToken>>>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            store: Arc::new(Mutex::new(DocumentStore::with_dir(&config.data_dir))),
            registry: Arc::new(Mutex::new(MappingRegistry::in_data_dir(&config.data_dir))),
            executor: ImportExecutor::new(config.row_delay()),
            import_lock: ImportLock::new(),
            running: Arc::new(Mutex::new(None)),
        }
    }
}

/// Build the API router
pub fn router(state: AppState, max_file_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/template", get(download_template))
        .route("/api/preview", post(preview_csv))
        .route("/api/import", post(import_csv))
        .route("/api/import/cancel", post(cancel_import))
        .route("/api/documents", get(list_documents))
        .route("/api/export", get(export_documents))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(&config), config.max_file_size);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Knowledge-base import server running on http://localhost:{}", config.port);
    println!("   Data directory: {}", config.data_dir.display());
    println!("   POST /api/preview  - Validate a CSV upload");
    println!("   POST /api/import   - Import a CSV upload");
    println!("   GET  /api/template - CSV template");
    println!("   GET  /api/export   - Export documents as CSV");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(e) => pipeline_status(e),
        };
        log_error(format!("{} {}", status.as_u16(), self));
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Csv(_) | PipelineError::Wizard(WizardError::Parse(_)) => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::ValidationFailed { .. } | PipelineError::Wizard(WizardError::Blocked(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::Wizard(WizardError::Import(ImportError::AlreadyRunning)) => {
            StatusCode::CONFLICT
        }
        PipelineError::Wizard(WizardError::Mapping(_))
        | PipelineError::Wizard(WizardError::Import(ImportError::InvalidSettings(_))) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kb-import",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "preview": "POST /api/preview",
            "import": "POST /api/import",
            "template": "GET /api/template",
            "documents": "GET /api/documents",
            "export": "GET /api/export",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn csv_attachment(content: String, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        content,
    )
        .into_response()
}

async fn download_template() -> ServerResult<Response> {
    let csv = template_csv().map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(csv_attachment(csv, TEMPLATE_FILE_NAME))
}

async fn list_documents(State(state): State<AppState>) -> Json<Vec<KnowledgeDocument>> {
    let store = state.store.lock().await;
    Json(store.list().into_iter().cloned().collect())
}

async fn export_documents(State(state): State<AppState>) -> ServerResult<Response> {
    let store = state.store.lock().await;
    let csv = export_csv(store.list()).map_err(|e| ServerError::Internal(e.to_string()))?;
    let file_name = format!("knowledge_base_{}.csv", chrono::Utc::now().format("%Y%m%d"));
    Ok(csv_attachment(csv, &file_name))
}

/// A multipart upload
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
    options: UploadOptions,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<Upload> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = UploadOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "mapping" | "settings" | "dryRun" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                apply_option(&mut options, &name, &text)?;
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    Ok(Upload {
        file_name,
        bytes,
        options,
    })
}

fn apply_option(options: &mut UploadOptions, name: &str, text: &str) -> ServerResult<()> {
    let bad = |e: &dyn std::fmt::Display| ServerError::BadRequest(format!("Invalid {}: {}", name, e));
    match name {
        "mapping" => {
            options.mapping = Some(ColumnMapping::from_json(text).map_err(|e| bad(&e))?);
        }
        "settings" => {
            options.settings = Some(serde_json::from_str(text).map_err(|e| bad(&e))?);
        }
        "dryRun" => {
            options.dry_run = text.trim().parse().map_err(|e| bad(&e))?;
        }
        _ => {}
    }
    Ok(())
}

async fn preview_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<PreviewResponse>> {
    let upload = read_upload(multipart).await?;
    log_info(format!("🔎 Preview of {} ({} bytes)", upload.file_name, upload.bytes.len()));

    let registry = state.registry.lock().await;
    let output = preview(
        &upload.bytes,
        &upload.file_name,
        upload.options.mapping,
        upload.options.settings.unwrap_or_default(),
        &registry,
    )?;

    Ok(Json(PreviewResponse::from(output)))
}

async fn import_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<ImportResponse>> {
    let upload = read_upload(multipart).await?;
    Ok(Json(import_upload(&state, upload).await?))
}

/// Run one import request.
///
/// Imports are the only writers, so the run works on a copy of the store and
/// registry and swaps it in at the end. Readers are never blocked by the row
/// loop.
async fn import_upload(state: &AppState, upload: Upload) -> ServerResult<ImportResponse> {
    let _guard = state
        .import_lock
        .try_acquire()
        .map_err(|e| PipelineError::from(WizardError::from(e)))?;

    let cancel = CancelToken::new();
    *state.running.lock().await = Some(cancel.clone());

    let request = ImportRequest {
        file_name: upload.file_name,
        mapping: upload.options.mapping,
        settings: upload.options.settings.unwrap_or_default(),
        dry_run: upload.options.dry_run,
        ..Default::default()
    };

    let mut store = state.store.lock().await.clone();
    let mut registry = state.registry.lock().await.clone();
    let output = run_import(
        &upload.bytes,
        request,
        &mut store,
        &mut registry,
        &state.executor,
        &cancel,
    )
    .await;

    // a failed run may still have written files, so the copies are kept either way
    *state.store.lock().await = store;
    *state.registry.lock().await = registry;

    {
        let mut running = state.running.lock().await;
        if running.as_ref().is_some_and(|token| token.same_run(&cancel)) {
            *running = None;
        }
    }

    Ok(ImportResponse::from(output?))
}

async fn cancel_import(State(state): State<AppState>) -> Json<Value> {
    let running = state.running.lock().await;
    match running.as_ref() {
        Some(token) => {
            token.cancel();
            log_info("🛑 Cancellation requested");
            Json(json!({ "status": "ok", "cancelled": true }))
        }
        None => Json(json!({ "status": "ok", "cancelled": false })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsvError;

    #[test]
    fn test_pipeline_status_codes() {
        let parse: PipelineError = WizardError::Parse(CsvError::EmptyFile).into();
        assert_eq!(pipeline_status(&parse), StatusCode::BAD_REQUEST);

        let blocked = PipelineError::ValidationFailed { errors: 3 };
        assert_eq!(pipeline_status(&blocked), StatusCode::UNPROCESSABLE_ENTITY);

        let busy: PipelineError = WizardError::Import(ImportError::AlreadyRunning).into();
        assert_eq!(pipeline_status(&busy), StatusCode::CONFLICT);
    }

    #[test]
    fn test_apply_option() {
        let mut options = UploadOptions::default();
        apply_option(&mut options, "mapping", r#"{"title": "Name"}"#).unwrap();
        apply_option(&mut options, "settings", r#"{"conflictResolution": "overwrite"}"#).unwrap();
        apply_option(&mut options, "dryRun", "true").unwrap();

        assert_eq!(options.mapping.as_ref().unwrap().column_for("title"), Some("Name"));
        assert!(options.settings.is_some());
        assert!(options.dry_run);

        let err = apply_option(&mut options, "mapping", r#"{"author": "Name"}"#).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    fn upload(csv: String) -> Upload {
        Upload {
            file_name: "strategies.csv".to_string(),
            bytes: csv.into_bytes(),
            options: UploadOptions::default(),
        }
    }

    fn rows(count: usize) -> String {
        let mut csv = String::from("Title,Sector\n");
        for i in 0..count {
            csv.push_str(&format!("Doc {},rail\n", i));
        }
        csv
    }

    #[tokio::test]
    async fn test_import_upload_stores_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            row_delay_ms: 0,
            ..Config::default().with_data_dir(dir.path())
        };
        let state = AppState::new(&config);

        let response = import_upload(&state, upload(rows(3))).await.unwrap();
        assert_eq!(response.result.new_records, 3);
        assert_eq!(state.store.lock().await.len(), 3);
        assert!(state.running.lock().await.is_none());
        assert!(!state.import_lock.is_locked());
    }

    #[tokio::test]
    async fn test_concurrent_import_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_data_dir(dir.path());
        let state = AppState::new(&config);
        let _held = state.import_lock.try_acquire().unwrap();

        let err = import_upload(&state, upload(rows(2))).await.unwrap_err();
        match &err {
            ServerError::Pipeline(e) => assert_eq!(pipeline_status(e), StatusCode::CONFLICT),
            other => panic!("unexpected error: {}", other),
        }
        assert!(state.running.lock().await.is_none());
        assert!(state.store.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_running_import() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            row_delay_ms: 20,
            ..Config::default().with_data_dir(dir.path())
        };
        let state = AppState::new(&config);

        let Json(idle) = cancel_import(State(state.clone())).await;
        assert_eq!(idle["cancelled"], false);

        let task = tokio::spawn({
            let state = state.clone();
            async move { import_upload(&state, upload(rows(50))).await }
        });

        while state.running.lock().await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // documents stay readable while rows are being imported
        assert!(state.store.lock().await.is_empty());

        let Json(body) = cancel_import(State(state.clone())).await;
        assert_eq!(body["cancelled"], true);

        let response = task.await.unwrap().unwrap();
        assert!(response.result.cancelled);
        assert!(response.result.new_records < 50);
        assert_eq!(state.store.lock().await.len(), response.result.new_records);
        assert!(state.running.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_router_builds_with_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_data_dir(dir.path());
        let state = AppState::new(&config);
        let _app = router(state.clone(), config.max_file_size);
        assert!(state.running.lock().await.is_none());
    }
}
