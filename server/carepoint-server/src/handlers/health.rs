use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::server::CarePointServer;

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub checks: HashMap<String, String>,
}

/// Version information response
#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

/// Health check handler
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse),
        (status = 503, description = "Service unavailable")
    ),
    tag = "health"
)]
pub async fn health_check(
    State(server): State<CarePointServer>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    let mut checks = HashMap::new();

    let database_healthy = server.database.is_healthy().await;
    checks.insert(
        "database".to_string(),
        if database_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
    );

    if !database_healthy {
        return Err(ApiError::ServiceUnavailable {
            message: "database is unreachable".to_string(),
        });
    }

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };

    Ok(Json(api_success(response)))
}

/// Version information handler
#[utoipa::path(
    get,
    path = "/version",
    responses(
        (status = 200, description = "Version info", body = VersionResponse)
    ),
    tag = "health"
)]
pub async fn version_info() -> Json<ApiResponse<VersionResponse>> {
    Json(api_success(VersionResponse {
        name: "CarePoint Platform".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
