//! HTTP surface for the review workflow: upload, validate, correct,
//! import, roll back. Handlers stay thin; the pipeline modules hold the
//! semantics and this layer only maps their results onto status codes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::corrections;
use crate::db::models::{
    AliasEntry, ColumnMap, NormalizationSummary, UploadBatch, UploadRow, ValidationStatus,
};
use crate::db::Database;
use crate::error::PipelineError;
use crate::import;
use crate::ingest::{self, IngestedRow};
use crate::sync::{self, ScoreProvider};
use crate::teams::TeamResolver;
use crate::validation::{self, ValidationSettings};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub resolver: Arc<TeamResolver>,
    pub provider: Arc<dyn ScoreProvider>,
    pub settings: ValidationSettings,
    pub max_upload_bytes: usize,
    pub max_upload_rows: usize,
    pub sync_timeout: Duration,
}

/// Build the Axum router for the review API.
pub fn router(state: AppState) -> Router {
    // Axum's default body cap is 2 MB; uploads are bounded by config instead.
    let body_cap = state.max_upload_bytes + 1024;
    Router::new()
        .route("/api/uploads", post(upload_handler))
        .route("/api/uploads/preview", post(preview_handler))
        .route("/api/batches", get(list_batches_handler))
        .route("/api/batches/:id", get(batch_handler))
        .route("/api/batches/:id/rows", get(rows_handler))
        .route("/api/batches/:id/validate", post(validate_handler))
        .route("/api/batches/:id/revalidate", post(validate_handler))
        .route("/api/batches/:id/corrections", post(corrections_handler))
        .route("/api/batches/:id/import-summary", get(import_summary_handler))
        .route("/api/batches/:id/import", post(import_handler))
        .route("/api/batches/:id/rollback", post(rollback_handler))
        .route("/api/aliases", get(aliases_handler).post(add_alias_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/stats", get(stats_handler))
        .layer(DefaultBodyLimit::max(body_cap))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// User-correctable errors surface their message; internals are logged
/// and replaced with a generic reply.
fn error_reply(err: PipelineError) -> (StatusCode, String) {
    let status = err.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {err:?}");
        (status, "internal error".to_string())
    } else {
        (status, err.to_string())
    }
}

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    error_reply(PipelineError::Internal(err))
}

fn batch_not_found(batch_id: i64) -> (StatusCode, String) {
    error_reply(PipelineError::ValidationInput(format!(
        "batch {batch_id} not found"
    )))
}

/// Mutating endpoints attribute their changes to the X-Actor header.
fn require_actor(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            error_reply(PipelineError::ValidationInput(
                "missing X-Actor header".to_string(),
            ))
        })
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub batch_id: i64,
    pub file_name: String,
    pub total_rows: i64,
    pub column_mapping: ColumnMap,
    pub normalization: NormalizationSummary,
}

/// POST /api/uploads?file_name=bets.xlsx with the raw file as the body.
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let actor = require_actor(&headers)?;
    let file_name = query.file_name.unwrap_or_else(|| "upload.csv".to_string());
    let outcome = ingest::ingest_bytes(
        &file_name,
        &body,
        state.max_upload_bytes,
        state.max_upload_rows,
    )
    .map_err(error_reply)?;

    persist_upload(&state.db, &actor, &file_name, outcome)
        .map(Json)
        .map_err(internal)
}

/// Store an ingested file as a PENDING batch. The normalized record is
/// snapshotted into `original_value` so corrections stay diffable later.
fn persist_upload(
    db: &Database,
    actor: &str,
    file_name: &str,
    outcome: ingest::IngestOutcome,
) -> anyhow::Result<UploadResponse> {
    let rows: Vec<UploadRow> = outcome
        .rows
        .into_iter()
        .map(|row| {
            let original_value = serde_json::to_value(&row.normalized).ok();
            UploadRow {
                id: None,
                batch_id: 0,
                row_number: row.row_number,
                raw_fields: row.raw_fields,
                normalized: row.normalized,
                warnings: row.warnings,
                original_value,
                actual_value: None,
                validation_status: ValidationStatus::Pending,
                receipt: None,
                field_confidence: Default::default(),
                uncertain_reasons: Vec::new(),
                corrected_by: None,
                corrected_at: None,
                correction_action: None,
                imported_bet_id: None,
                imported_at: None,
            }
        })
        .collect();

    let batch = UploadBatch {
        id: None,
        uploaded_by: actor.to_string(),
        file_name: file_name.to_string(),
        total_rows: rows.len() as i64,
        column_mapping: outcome.mapping,
        normalization: outcome.summary,
        correct_count: 0,
        flagged_count: 0,
        uncertain_count: 0,
        created_at: Utc::now(),
    };
    let batch_id = db.insert_batch_with_rows(&batch, &rows)?;
    Ok(UploadResponse {
        batch_id,
        file_name: batch.file_name,
        total_rows: batch.total_rows,
        column_mapping: batch.column_mapping,
        normalization: batch.normalization,
    })
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub total_rows: usize,
    pub column_mapping: ColumnMap,
    pub normalization: NormalizationSummary,
    pub sample: Vec<IngestedRow>,
}

/// POST /api/uploads/preview runs a dry-run ingestion; nothing is stored.
async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let file_name = query.file_name.unwrap_or_else(|| "upload.csv".to_string());
    let outcome = ingest::ingest_bytes(
        &file_name,
        &body,
        state.max_upload_bytes,
        state.max_upload_rows,
    )
    .map_err(error_reply)?;

    let total_rows = outcome.rows.len();
    let sample: Vec<IngestedRow> = outcome.rows.into_iter().take(10).collect();
    Ok(Json(PreviewResponse {
        total_rows,
        column_mapping: outcome.mapping,
        normalization: outcome.summary,
        sample,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchesQuery {
    pub limit: Option<i64>,
}

/// GET /api/batches?limit=20
async fn list_batches_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BatchesQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    state.db.list_batches(limit).map(Json).map_err(internal)
}

/// GET /api/batches/:id
async fn batch_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .get_batch(batch_id)
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| batch_not_found(batch_id))
}

#[derive(Debug, Deserialize)]
pub struct RowsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RowsPage {
    pub total: i64,
    pub rows: Vec<UploadRow>,
}

/// GET /api/batches/:id/rows?status=FLAGGED&limit=100&offset=0
async fn rows_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
    Query(query): Query<RowsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = match query.status.as_deref() {
        Some(s) => Some(ValidationStatus::parse(s).ok_or_else(|| {
            error_reply(PipelineError::ValidationInput(format!(
                "unknown status '{s}'"
            )))
        })?),
        None => None,
    };
    state
        .db
        .get_batch(batch_id)
        .map_err(internal)?
        .ok_or_else(|| batch_not_found(batch_id))?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let total = state.db.count_rows(batch_id, status).map_err(internal)?;
    let rows = state
        .db
        .list_rows_page(batch_id, status, limit, offset)
        .map_err(internal)?;
    Ok(Json(RowsPage { total, rows }))
}

/// POST /api/batches/:id/validate, also mounted at /revalidate; a rerun
/// overwrites each row's receipt and re-derives the batch counters.
async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validation::validate_batch(&state.db, &state.resolver, state.settings, batch_id)
        .await
        .map(Json)
        .map_err(error_reply)
}

/// POST /api/batches/:id/corrections with a JSON array of decisions.
async fn corrections_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
    headers: HeaderMap,
    Json(items): Json<Vec<serde_json::Value>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let actor = require_actor(&headers)?;
    corrections::apply_corrections(&state.db, batch_id, &actor, &items)
        .map(Json)
        .map_err(error_reply)
}

/// GET /api/batches/:id/import-summary
async fn import_summary_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    import::pre_import_summary(&state.db, batch_id)
        .map(Json)
        .map_err(error_reply)
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportRequest {
    /// Restrict the import to these rows; omitted means every eligible row.
    #[serde(default)]
    pub row_ids: Option<Vec<i64>>,
}

/// POST /api/batches/:id/import; an optional JSON body selects rows.
async fn import_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<ImportRequest>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let actor = require_actor(&headers)?;
    let row_ids = body.and_then(|Json(req)| req.row_ids);
    import::import_rows(&state.db, batch_id, &actor, row_ids.as_deref())
        .map(Json)
        .map_err(error_reply)
}

/// POST /api/batches/:id/rollback undoes the batch's latest import.
async fn rollback_handler(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let actor = require_actor(&headers)?;
    import::rollback_import(&state.db, batch_id, &actor)
        .map(Json)
        .map_err(error_reply)
}

/// GET /api/aliases
async fn aliases_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.db.list_aliases().map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
    pub alias: String,
    pub canonical: String,
}

/// POST /api/aliases upserts and drops the resolver cache so the new
/// mapping applies to the next lookup.
async fn add_alias_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AliasRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let alias = req.alias.trim();
    let canonical = req.canonical.trim();
    if alias.is_empty() || canonical.is_empty() {
        return Err(error_reply(PipelineError::ValidationInput(
            "alias and canonical must be non-empty".to_string(),
        )));
    }
    let id = state.db.upsert_alias(alias, canonical).map_err(internal)?;
    state.resolver.invalidate().await;
    Ok(Json(AliasEntry {
        id: Some(id),
        alias: alias.to_string(),
        canonical: canonical.to_string(),
    }))
}

/// POST /api/sync runs one on-demand cycle outside the background loop.
async fn sync_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    sync::run_sync_cycle(
        &state.db,
        &state.resolver,
        state.provider.as_ref(),
        state.sync_timeout,
    )
    .await
    .map(Json)
    .map_err(error_reply)
}

/// GET /api/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.db.get_stats().map(Json).map_err(internal)
}
