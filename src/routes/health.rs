//! Health check endpoints
//!
//! - /health: liveness, 200 whenever the process is serving
//! - /ready: readiness, 200 only when the campaign store answers a ping
//! - /version: build metadata for deployment verification

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::routes::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub validation_enabled: bool,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        validation_enabled: state.validation_enabled,
    };
    json_response(StatusCode::OK, &response)
}

pub async fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    match state.store.ping().await {
        Ok(()) => json_response(
            StatusCode::OK,
            &ReadinessResponse {
                ready: true,
                store: state.store_kind,
                error: None,
            },
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &ReadinessResponse {
                    ready: false,
                    store: state.store_kind,
                    error: Some(e.to_string()),
                },
            )
        }
    }
}

pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "rally",
    };
    json_response(StatusCode::OK, &response)
}
