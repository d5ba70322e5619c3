use axum::{extract::State, Extension, Json};
use covasync_sync::{BatchImageJob, ImageBatchProgress, StoreError};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ResetData {
    reset: bool,
}

fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    tracing::error!(error = %error, "image job store access failed");
    ApiError::new(request_id, "internal_error", "image job failed")
}

/// Hands the next slice of the catalog to the asset collaborator.
pub(super) async fn run_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ImageBatchProgress>>, ApiError> {
    let Some(sink) = state.assets.as_deref() else {
        return Err(ApiError::new(
            req_id.0,
            "not_configured",
            "asset webhook is not configured",
        ));
    };
    let Ok(_guard) = state.image_lock.try_lock() else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "an image batch is already in progress",
        ));
    };

    let store = state.runner.store();
    let progress = BatchImageJob::new(&store, sink, state.config.image_batch_size)
        .run_batch()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: progress,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn reset(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ResetData>>, ApiError> {
    let Ok(_guard) = state.image_lock.try_lock() else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "an image batch is already in progress",
        ));
    };

    let store = state.runner.store();
    let no_assets: Option<covasync_sync::WebhookAssetSink> = None;
    BatchImageJob::new(&store, &no_assets, state.config.image_batch_size)
        .reset()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ResetData { reset: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}
