//! HTTP routes for Rally
//!
//! Handlers return `Result<Response<Full<Bytes>>>`; the server turns errors
//! into the JSON error envelope with [`error_response`].

pub mod campaigns;
pub mod evidence;
pub mod health;

pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::auth::{extract_token_from_header, AuthProvider, AuthUser};
use crate::types::{CampaignError, Result};

/// Recognized API routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    CreateCampaign,
    MyCampaigns,
    TeamCampaigns,
    CampaignStats,
    GetCampaign(String),
    ApplyStep(String),
    UploadEvidence(String),
    EvidenceValidation {
        campaign_id: String,
        evidence_id: String,
    },
}

/// Match a method and path under `/api/campaigns`
pub fn match_route(method: &Method, path: &str) -> Option<Route> {
    let rest = path.strip_prefix("/api/campaigns")?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let segments: Vec<&str> = rest
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let route = match (method, segments.as_slice()) {
        (&Method::POST, []) => Route::CreateCampaign,
        (&Method::GET, ["my-campaigns"]) => Route::MyCampaigns,
        (&Method::GET, ["team-campaigns"]) => Route::TeamCampaigns,
        (&Method::GET, ["campaign-stats"]) => Route::CampaignStats,
        (&Method::GET, [id]) => Route::GetCampaign(id.to_string()),
        (&Method::PUT, [id, "step"]) => Route::ApplyStep(id.to_string()),
        (&Method::POST, [id, "evidence"]) => Route::UploadEvidence(id.to_string()),
        (&Method::PUT, [campaign_id, "evidence", evidence_id, "validation"]) => {
            Route::EvidenceValidation {
                campaign_id: campaign_id.to_string(),
                evidence_id: evidence_id.to_string(),
            }
        }
        _ => return None,
    };
    Some(route)
}

/// JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal serialization error");
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    response
}

fn plain_error(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}

/// `{"success": true, "message"?, "data"}`
pub fn success<T: Serialize>(
    status: StatusCode,
    message: Option<&str>,
    data: &T,
) -> Response<Full<Bytes>> {
    let mut body = json!({ "success": true, "data": data });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    json_response(status, &body)
}

/// Error envelope; `detail` only in dev mode
pub fn error_response(err: &CampaignError, dev_mode: bool) -> Response<Full<Bytes>> {
    let mut error = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });

    match err {
        CampaignError::Validation { fields, .. } if !fields.is_empty() => {
            error["fields"] = json!(fields);
        }
        CampaignError::PartialIngest { persisted, .. } => {
            error["persisted"] = json!(persisted);
        }
        _ => {}
    }
    if err.is_retryable() {
        error["retryable"] = json!(true);
    }
    if dev_mode {
        error["detail"] = json!(format!("{:?}", err));
    }

    json_response(err.status_code(), &json!({ "success": false, "error": error }))
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(&CampaignError::NotFound(format!("Route {}", path)), false)
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Authorization, Content-Type, X-Validation-Key"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    response
}

/// Collect a request body, refusing anything over `limit` bytes
pub async fn read_body(body: Incoming, limit: usize) -> Result<Bytes> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => Err(CampaignError::validation(
            format!("Request body exceeds {} bytes", limit),
        )),
        Err(e) => Err(CampaignError::Internal(format!("Failed to read body: {}", e))),
    }
}

/// Parse a JSON body; an empty body reads as `null`
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| CampaignError::validation(format!("Invalid JSON: {}", e)))
}

/// Resolve the bearer token on a request to a user
pub async fn authenticate(headers: &HeaderMap, auth: &dyn AuthProvider) -> Result<AuthUser> {
    let header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
    let token = extract_token_from_header(header)
        .ok_or_else(|| CampaignError::Unauthorized("Missing bearer token".into()))?;
    auth.verify(token).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_route() {
        assert_eq!(
            match_route(&Method::POST, "/api/campaigns"),
            Some(Route::CreateCampaign)
        );
        assert_eq!(
            match_route(&Method::GET, "/api/campaigns/my-campaigns"),
            Some(Route::MyCampaigns)
        );
        assert_eq!(
            match_route(&Method::GET, "/api/campaigns/abc"),
            Some(Route::GetCampaign("abc".into()))
        );
        assert_eq!(
            match_route(&Method::PUT, "/api/campaigns/abc/step/"),
            Some(Route::ApplyStep("abc".into()))
        );
        assert_eq!(
            match_route(&Method::PUT, "/api/campaigns/c/evidence/e/validation"),
            Some(Route::EvidenceValidation {
                campaign_id: "c".into(),
                evidence_id: "e".into()
            })
        );
        assert_eq!(match_route(&Method::DELETE, "/api/campaigns/abc"), None);
        assert_eq!(match_route(&Method::GET, "/api/other"), None);
        assert_eq!(match_route(&Method::GET, "/api/campaignsx"), None);
    }

    #[test]
    fn test_parse_json_empty_body_is_null() {
        let value: serde_json::Value = parse_json(b"  ").unwrap();
        assert!(value.is_null());
        assert!(parse_json::<serde_json::Value>(b"{oops").is_err());
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let err = CampaignError::missing_fields(&["title"]);
        let response = error_response(&err, false);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["fields"][0]["field"], "title");
        assert!(body["error"].get("detail").is_none());

        let body = body_json(error_response(&CampaignError::Conflict("busy".into()), true)).await;
        assert_eq!(body["error"]["retryable"], true);
        assert!(body["error"]["detail"].is_string());
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let body = body_json(success(StatusCode::CREATED, Some("Created"), &json!({"id": 1}))).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Created");
        assert_eq!(body["data"]["id"], 1);
    }
}
