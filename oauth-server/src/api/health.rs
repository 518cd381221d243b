use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Represents the health status of a component or the overall service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatusType {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Status of an individual component
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    pub status: HealthStatusType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatusType,
    /// Absent for the liveness check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<ComponentStatus>,
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

async fn check_store_health(state: &AppState) -> HealthResponse {
    if state.health_check().await {
        debug!("Health check passed for the store");
        HealthResponse {
            status: HealthStatusType::Ok,
            store: Some(ComponentStatus {
                status: HealthStatusType::Ok,
                error: None,
            }),
            status_code: StatusCode::OK,
        }
    } else {
        info!("Health check failed: store is not reachable");
        HealthResponse {
            status: HealthStatusType::Error,
            store: Some(ComponentStatus {
                status: HealthStatusType::Error,
                error: Some("store is not reachable".to_string()),
            }),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Liveness check handler, does not touch the store
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    HealthResponse {
        status: HealthStatusType::Ok,
        store: None,
        status_code: StatusCode::OK,
    }
}

/// Healthy check handler
#[utoipa::path(
    get,
    path = "/healthy",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is not healthy", body = HealthResponse)
    )
)]
pub async fn healthy_check(State(state): State<AppState>) -> impl IntoResponse {
    check_store_health(&state).await
}

/// Ready check handler - alias to healthy check
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse)
    )
)]
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    check_store_health(&state).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthy", get(healthy_check))
        .route("/ready", get(ready_check))
}
