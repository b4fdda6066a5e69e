//! Campaign endpoints
//!
//! - POST /api/campaigns
//! - PUT  /api/campaigns/:id/step
//! - GET  /api/campaigns/:id
//! - GET  /api/campaigns/my-campaigns
//! - GET  /api/campaigns/team-campaigns
//! - GET  /api/campaigns/campaign-stats

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::db::schemas::CampaignStatus;
use crate::routes::{authenticate, parse_json, read_body, success};
use crate::server::AppState;
use crate::store::{CampaignQuery, SortField, SortOrder};
use crate::types::{CampaignError, Result};
use crate::workflow::payload::CreateCampaignInput;

/// Upper bound on `limit` for listings
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize)]
struct StepRequest {
    step: Option<i64>,
    #[serde(default)]
    data: Value,
}

pub async fn create_campaign(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
    let input: Option<CreateCampaignInput> = parse_json(&body)?;

    let campaign = state
        .engine
        .create_campaign(&user, input.unwrap_or_default())
        .await?;
    Ok(success(
        StatusCode::CREATED,
        Some("Campaign created successfully"),
        &campaign,
    ))
}

pub async fn apply_step(
    state: &AppState,
    campaign_id: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
    let request: StepRequest = parse_json::<Option<StepRequest>>(&body)?
        .ok_or_else(|| CampaignError::missing_fields(&["step"]))?;
    let step = request
        .step
        .ok_or_else(|| CampaignError::missing_fields(&["step"]))?;

    debug!(campaign_id = %campaign_id, step, "Applying campaign step");
    let aggregate = state
        .engine
        .apply_step(campaign_id, &user.user_id, step, request.data)
        .await?;

    let message = if aggregate.campaign.creation_complete {
        "Campaign creation completed".to_string()
    } else {
        format!("Step {} completed successfully", step)
    };
    Ok(success(StatusCode::OK, Some(&message), &aggregate))
}

pub async fn get_campaign(state: &AppState, campaign_id: &str) -> Result<Response<Full<Bytes>>> {
    let aggregate = state.queries.get_campaign(campaign_id).await?;
    Ok(success(StatusCode::OK, None, &aggregate))
}

pub async fn my_campaigns(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let query = list_query(req.uri().query())?;
    let listing = state.queries.my_campaigns(&user.user_id, &query).await?;
    Ok(success(StatusCode::OK, None, &listing))
}

pub async fn team_campaigns(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let campaigns = state.queries.team_campaigns(&user.user_id).await?;
    Ok(success(StatusCode::OK, None, &campaigns))
}

pub async fn campaign_stats(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let stats = state.queries.campaign_stats(&user.user_id).await?;
    Ok(success(StatusCode::OK, None, &stats))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<u64>,
    limit: Option<u64>,
    status: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    search: Option<String>,
}

/// Parse `?page&limit&status&sort&order&search`; `status` may be a
/// comma-separated list
fn list_query(query: Option<&str>) -> Result<CampaignQuery> {
    let params: ListParams = serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| CampaignError::validation(format!("Invalid query string: {}", e)))?;
    let defaults = CampaignQuery::default();

    let statuses = match params.status.as_deref() {
        None => Vec::new(),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "all")
            .map(|s| {
                s.parse::<CampaignStatus>()
                    .map_err(|e| CampaignError::invalid_field("status", e))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let sort = match params.sort.as_deref() {
        None | Some("") => defaults.sort,
        Some(field) => field
            .parse::<SortField>()
            .map_err(|e| CampaignError::invalid_field("sort", e))?,
    };

    let order = match params.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => defaults.order,
        Some("asc") | Some("1") => SortOrder::Asc,
        Some("desc") | Some("-1") => SortOrder::Desc,
        Some(other) => {
            return Err(CampaignError::invalid_field(
                "order",
                format!("expected asc or desc, got '{}'", other),
            ))
        }
    };

    Ok(CampaignQuery {
        page: params.page.unwrap_or(defaults.page).max(1),
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        statuses,
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        sort,
        order,
    })
}
