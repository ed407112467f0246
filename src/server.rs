//!
//! csvserve HTTP server
//! --------------------
//! Axum-based HTTP surface for the upload-and-query service.
//!
//! Responsibilities:
//! - Startup bootstrap: upload directory creation and store initialization.
//! - `GET /` landing page.
//! - `POST /upload_csv` multipart ingestion endpoint.
//! - `POST /query` verbatim SQL execution endpoint.
//!
//! Every handler performs its whole store interaction on a per-request
//! connection and drops it before responding; there are no sessions,
//! background tasks, retries, or timeouts.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::ingest;
use crate::storage::{Store, UncheckedSql};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<ServerConfig>,
}

/// Start the server with configuration taken from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()).await
}

/// Bootstrap the store and upload directory, mount all routes, and serve
/// on all interfaces. Failure to reach the store or create the upload
/// directory is fatal to startup.
pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;
    let store = Store::new(&config.db_path);
    store
        .initialize()
        .with_context(|| format!("initializing store at {}", config.db_path.display()))?;

    let http_port = config.http_port;
    let app = router(AppState { store, config: Arc::new(config) });

    let addr: SocketAddr = format!("0.0.0.0:{http_port}").parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mount all routes over the given state. Split out so tests can drive the
/// router in-process.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload_csv", post(upload_csv))
        .route("/query", post(query_handler))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Pull the `file` field out of the multipart body.
async fn read_file_field(mut multipart: Multipart) -> AppResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::user("bad_multipart", e.to_string().as_str()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(AppError::user("no_selected_file", "No selected file"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::user("bad_multipart", e.to_string().as_str()))?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(AppError::user("no_file_part", "No file part"))
}

async fn upload_csv(State(state): State<AppState>, multipart: Multipart) -> Response {
    let (file_name, bytes) = match read_file_field(multipart).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("{}", e.message());
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, e.message().to_string()).into_response();
        }
    };
    match ingest::ingest_upload(&state.config, &state.store, &file_name, &bytes) {
        Ok(report) => {
            info!(
                "File uploaded successfully: '{}' ({} rows, {} columns)",
                file_name,
                report.rows_appended,
                report.columns.len()
            );
            (StatusCode::OK, "File uploaded successfully".to_string()).into_response()
        }
        Err(e) => {
            error!("Error uploading file: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error uploading file: {e:#}")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryPayload {
    sql: String,
}

async fn query_handler(State(state): State<AppState>, Form(payload): Form<QueryPayload>) -> Response {
    info!("Executing SQL query: {}", payload.sql);
    match state.store.run_unchecked(UncheckedSql(&payload.sql)) {
        Ok(rows) => {
            info!("Query executed successfully, {} rows", rows.len());
            Json(json!({ "result": rows })).into_response()
        }
        Err(e) => {
            error!("Error executing query: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error executing query: {e:#}")).into_response()
        }
    }
}
