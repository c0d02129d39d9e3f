//! HTTP handlers for the review API.
//!
//! Handlers are thin: they decode the body, call `ReviewApi`, and map a
//! `ReviewError` onto a status code with its `ErrorPayload` as the body.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use reviewgate_core::{
    AcquireLockResponse, ApproveRequest, AttachMediaRequest, DecisionRequest, ErrorCode, ItemId,
    ItemPage, ItemResponse, ListFilter, LockHolder, RejectRequest, ReleaseLockRequest,
    ReleaseLockResponse, ReviewError, Submission,
};

use crate::AppState;

/// A `ReviewError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ReviewError);

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        Self(err)
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::LockConflict | ErrorCode::VersionConflict | ErrorCode::AlreadyProcessed => {
            StatusCode::CONFLICT
        }
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code());
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(self.0.to_payload())).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "reviewgate",
        "version": crate::get_service_version(),
    }))
}

/// Handler: GET /api/items
async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<ItemPage> {
    Ok(Json(state.api.list_work_items(&filter).await?))
}

/// Handler: POST /api/items
async fn submit_item(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<Submission>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let item = state.api.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(ItemResponse { item })))
}

/// Handler: GET /api/items/:id
async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ItemResponse> {
    let item = state.api.get_work_item(&ItemId::from(id)).await?;
    Ok(Json(ItemResponse { item }))
}

/// Handler: POST /api/items/:id/lock
async fn acquire_lock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(holder): Json<LockHolder>,
) -> ApiResult<AcquireLockResponse> {
    Ok(Json(state.api.acquire_lock(&ItemId::from(id), &holder).await?))
}

/// Handler: POST /api/items/:id/lock/release
///
/// Always 200; `released` says whether the token still named the lease.
async fn release_lock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReleaseLockRequest>,
) -> Json<ReleaseLockResponse> {
    Json(
        state
            .api
            .release_lock(&ItemId::from(id), &body.lock_token)
            .await,
    )
}

/// Handler: POST /api/items/:id/approve
async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> ApiResult<ItemResponse> {
    let item = state
        .api
        .approve(&ItemId::from(id), &DecisionRequest::from(&body))
        .await?;
    Ok(Json(ItemResponse { item }))
}

/// Handler: POST /api/items/:id/reject
async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<ItemResponse> {
    let item = state
        .api
        .reject(&ItemId::from(id), &DecisionRequest::from(&body), &body.reason)
        .await?;
    Ok(Json(ItemResponse { item }))
}

/// Handler: POST /api/items/:id/media
async fn attach_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AttachMediaRequest>,
) -> ApiResult<ItemResponse> {
    let item = state
        .api
        .attach_media(
            &ItemId::from(id),
            &DecisionRequest::from(&body),
            &body.media_ref,
        )
        .await?;
    Ok(Json(ItemResponse { item }))
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/items", get(list_items).post(submit_item))
        .route("/api/items/:id", get(get_item))
        .route("/api/items/:id/lock", post(acquire_lock))
        .route("/api/items/:id/lock/release", post(release_lock))
        .route("/api/items/:id/approve", post(approve))
        .route("/api/items/:id/reject", post(reject))
        .route("/api/items/:id/media", post(attach_media))
}
