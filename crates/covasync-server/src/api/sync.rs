use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use covasync_sync::TriggerSource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

const RUN_TYPES: &[&str] = &["sync", "prices", "inventory", "publish"];

#[derive(Debug, Deserialize)]
pub(super) struct TriggerQuery {
    /// Walk the whole catalog instead of the changes since the last sync.
    pub full: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncAccepted {
    status: &'static str,
    mode: &'static str,
}

/// Starts an orchestrated sync in the background. Progress shows up in the
/// run and event logs.
pub(super) async fn trigger_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<TriggerQuery>,
) -> Result<(StatusCode, Json<ApiResponse<SyncAccepted>>), ApiError> {
    let force_full = query.full.unwrap_or(false);

    if state.runner.spawn_sync(force_full, TriggerSource::Api).is_none() {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "a sync run is already in progress",
        ));
    }

    tracing::info!(force_full, "api: sync run started");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: SyncAccepted {
                status: "started",
                mode: if force_full { "full" } else { "incremental" },
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    #[serde(rename = "type")]
    pub run_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    run_type: String,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    records_failed: i32,
    summary: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    if let Some(run_type) = query.run_type.as_deref() {
        if !RUN_TYPES.contains(&run_type) {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("type must be one of: {}", RUN_TYPES.join(", ")),
            ));
        }
    }

    let rows = covasync_db::list_sync_runs(
        &state.pool,
        query.run_type.as_deref(),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| SyncRunItem {
            sync_run_id: row.public_id,
            run_type: row.run_type,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            records_processed: row.records_processed,
            records_failed: row.records_failed,
            summary: row.summary,
            error_message: row.error_message,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncEventItem {
    level: String,
    message: String,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
}

pub(super) async fn list_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncEventItem>>>, ApiError> {
    let rows = covasync_db::list_sync_events(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| SyncEventItem {
            level: row.level,
            message: row.message,
            context: row.context,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
