//! REST API Handlers
//!
//! JSON rendition of the controller, identity and node services, plus
//! health, readiness and metrics endpoints.

use crate::controlplane::controller::{
    ControllerAdapter, ControllerPublishVolumeRequest, ControllerUnpublishVolumeRequest,
    CreateVolumeRequest, DeleteVolumeRequest, NodeId, ValidateVolumeCapabilitiesRequest,
    VolumeCapability, VolumeHandle,
};
use crate::error::{Error, ErrorCode};
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /v1/volumes/:id/publish`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBody {
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub readonly: bool,
    /// Handle metadata returned by create
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Body of `POST /v1/volumes/:id/unpublish`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpublishBody {
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Body of `POST /v1/volumes/:id/validate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

/// HTTP status for a protocol error code
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error wrapper rendered as `{"error": code, "message": ...}`
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        (
            status_for(code),
            Json(ApiErrorResponse {
                error: code.as_str().into(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    adapter: Arc<ControllerAdapter>,
    ready: Arc<AtomicBool>,
}

impl RestRouter {
    /// `ready` gates `/ready`; set it once the backends are activated
    pub fn new(adapter: Arc<ControllerAdapter>, ready: Arc<AtomicBool>) -> Self {
        Self { adapter, ready }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            adapter: self.adapter,
            ready: self.ready,
        };

        Router::new()
            // Controller service
            .route("/v1/volumes", post(create_volume).get(list_volumes))
            .route("/v1/volumes/:id", delete(delete_volume))
            .route("/v1/volumes/:id/publish", post(publish_volume))
            .route("/v1/volumes/:id/unpublish", post(unpublish_volume))
            .route("/v1/volumes/:id/validate", post(validate_volume))
            .route("/v1/capacity", get(get_capacity))
            .route("/v1/controller/capabilities", get(controller_capabilities))
            // Identity service
            .route("/v1/identity/versions", get(supported_versions))
            .route("/v1/identity/plugin-info", get(plugin_info))
            // Node service
            .route("/v1/node/id", get(node_id))
            .route("/v1/node/probe", get(probe_node))
            .route("/v1/node/capabilities", get(node_capabilities))
            // Operations
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    adapter: Arc<ControllerAdapter>,
    ready: Arc<AtomicBool>,
}

fn handle(id: String, metadata: BTreeMap<String, String>) -> Option<VolumeHandle> {
    Some(VolumeHandle { id, metadata })
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_volume(
    State(state): State<AppState>,
    Json(request): Json<CreateVolumeRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.adapter.create_volume(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_volumes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.adapter.list_volumes().await?))
}

async fn delete_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .adapter
        .delete_volume(DeleteVolumeRequest {
            volume_handle: handle(id, BTreeMap::new()),
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PublishBody>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .adapter
        .controller_publish_volume(ControllerPublishVolumeRequest {
            volume_handle: handle(id, body.metadata),
            node_id: body.node_id,
            readonly: body.readonly,
        })
        .await?;
    Ok(Json(response))
}

async fn unpublish_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UnpublishBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .adapter
        .controller_unpublish_volume(ControllerUnpublishVolumeRequest {
            volume_handle: handle(id, body.metadata),
            node_id: body.node_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn validate_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ValidateBody>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .adapter
        .validate_volume_capabilities(ValidateVolumeCapabilitiesRequest {
            volume_handle: handle(id, BTreeMap::new()),
            volume_capabilities: body.volume_capabilities,
        })
        .await?;
    Ok(Json(response))
}

async fn get_capacity(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.get_capacity())
}

async fn controller_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.controller_get_capabilities())
}

async fn supported_versions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.get_supported_versions())
}

async fn plugin_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.get_plugin_info())
}

async fn node_id(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.get_node_id())
}

async fn probe_node(State(state): State<AppState>) -> impl IntoResponse {
    state.adapter.probe_node();
    StatusCode::OK
}

async fn node_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.node_get_capabilities())
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "backends not activated")
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.adapter.metrics().encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            ApiError(e).into_response()
        }
    }
}
