//! HTTP API over the document service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents` | Submit a document (raw body, metadata in query) |
//! | `GET`  | `/documents` | List documents (`limit`, `offset`, `category`) |
//! | `GET`  | `/documents/{id}` | Fetch a document with its chunks |
//! | `DELETE` | `/documents/{id}` | Delete a document |
//! | `POST` | `/documents/{id}/reprocess` | Reset to `pending` and reprocess |
//! | `POST` | `/search` | Ranked retrieval |
//! | `GET`  | `/stats` | Counts by status and category |
//! | `GET`  | `/categories` | The category taxonomy |
//! | `GET`  | `/pipeline` | Worker pool counters |
//! | `POST` | `/uploads` | Stage an upload for the caller |
//! | `POST` | `/uploads/submit` | Submit the staged upload |
//! | `DELETE` | `/uploads` | Cancel the staged upload |
//! | `GET`  | `/health` | Health check |
//!
//! The caller's identity is taken from the `x-owner-id` header.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid input: title is required" } }
//! ```
//!
//! `bad_request` (400), `not_found` (404), `cancelled` (409), `too_large`
//! (413), extraction failures (422), `internal` (500).

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{ExtractError, ServiceError};
use crate::models::{Document, DocumentSummary, SearchResult};
use crate::queue::PipelineStats;
use crate::service::{Service, SubmitRequest};
use crate::session::StagedUpload;

const OWNER_HEADER: &str = "x-owner-id";

/// Open the store, start the worker pool and sweeper, and serve until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(Service::open(config).await?.with_queue());
    service.start_background().await?;

    let app = build_router(Arc::clone(&service));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("legally server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(service: Arc<Service>) -> Router {
    let body_limit = service.config().extraction.max_bytes + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/documents", post(handle_submit).get(handle_list))
        .route(
            "/documents/{id}",
            get(handle_get).delete(handle_delete),
        )
        .route("/documents/{id}/reprocess", post(handle_reprocess))
        .route("/search", post(handle_search))
        .route("/stats", get(handle_stats))
        .route("/categories", get(handle_categories))
        .route("/pipeline", get(handle_pipeline))
        .route("/uploads", post(handle_stage).delete(handle_cancel))
        .route("/uploads/submit", post(handle_submit_staged))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Cancelled(_) => StatusCode::CONFLICT,
            ServiceError::Extraction(ExtractError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &err {
            ServiceError::Persistence(inner) => {
                let detail = format!("{:#}", inner);
                tracing::error!(error = %detail, "request failed in store");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        AppError {
            status,
            code: err.code().to_string(),
            message,
        }
    }
}

fn owner_from(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| bad_request(format!("missing {} header", OWNER_HEADER)))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty() && v != "application/octet-stream")
}

/// Drop embedding vectors from listing payloads.
fn without_vectors(mut doc: Document) -> Document {
    doc.embedding = None;
    for chunk in &mut doc.chunks {
        chunk.embedding = None;
    }
    doc
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Deserialize)]
struct SubmitParams {
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    filename: String,
    format: Option<String>,
}

async fn handle_submit(
    State(service): State<Arc<Service>>,
    Query(params): Query<SubmitParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentSummary>), AppError> {
    let owner_id = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string();

    let summary = service
        .submit(SubmitRequest {
            content: body.to_vec(),
            format: params.format.or_else(|| content_type(&headers)),
            title: params.title,
            category: params.category,
            source: params.source,
            filename: params.filename,
            owner_id,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(summary)))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
    category: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<Document>,
}

async fn handle_list(
    State(service): State<Arc<Service>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let documents = service
        .list(params.limit, params.offset, params.category.as_deref())
        .await?
        .into_iter()
        .map(without_vectors)
        .collect();
    Ok(Json(ListResponse { documents }))
}

async fn handle_get(
    State(service): State<Arc<Service>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(service.get(&id).await?))
}

#[derive(Serialize)]
struct AckResponse {
    id: String,
    status: &'static str,
}

async fn handle_delete(
    State(service): State<Arc<Service>>,
    Path(id): Path<String>,
) -> Result<Json<AckResponse>, AppError> {
    service.delete(&id).await?;
    Ok(Json(AckResponse {
        id,
        status: "deleted",
    }))
}

async fn handle_reprocess(
    State(service): State<Arc<Service>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AckResponse>), AppError> {
    service.reprocess(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            id,
            status: "pending",
        }),
    ))
}

// ============ Retrieval ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<i64>,
    category: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(service): State<Arc<Service>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = service
        .search(&req.query, req.limit, req.category.as_deref())
        .await?;
    Ok(Json(SearchResponse { results }))
}

async fn handle_stats(
    State(service): State<Arc<Service>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = service.stats().await?;
    let by_status: serde_json::Map<String, serde_json::Value> = stats
        .by_status
        .into_iter()
        .map(|(k, v)| (k, v.into()))
        .collect();
    let by_category: serde_json::Map<String, serde_json::Value> = stats
        .by_category
        .into_iter()
        .map(|(k, v)| (k, v.into()))
        .collect();

    Ok(Json(serde_json::json!({
        "total": stats.total,
        "by_status": by_status,
        "by_category": by_category,
    })))
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<&'static str>,
}

async fn handle_categories(State(service): State<Arc<Service>>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: service.categories(),
    })
}

async fn handle_pipeline(State(service): State<Arc<Service>>) -> Json<PipelineStats> {
    Json(service.pipeline_status().unwrap_or_default())
}

// ============ Staged uploads ============

#[derive(Deserialize)]
struct StageParams {
    #[serde(default)]
    filename: String,
    format: Option<String>,
}

async fn handle_stage(
    State(service): State<Arc<Service>>,
    Query(params): Query<StageParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StagedUpload>, AppError> {
    let owner = owner_from(&headers)?;
    let format = params.format.or_else(|| content_type(&headers));
    let staged = service
        .stage_upload(&owner, &body, format.as_deref(), &params.filename)
        .await?;
    Ok(Json(staged))
}

#[derive(Deserialize)]
struct SubmitStagedRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    source: String,
}

async fn handle_submit_staged(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    Json(req): Json<SubmitStagedRequest>,
) -> Result<(StatusCode, Json<DocumentSummary>), AppError> {
    let owner = owner_from(&headers)?;
    let summary = service
        .submit_staged(&owner, &req.title, &req.category, &req.source)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn handle_cancel(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
) -> Result<Json<CancelResponse>, AppError> {
    let owner = owner_from(&headers)?;
    Ok(Json(CancelResponse {
        cancelled: service.cancel_upload(&owner),
    }))
}
