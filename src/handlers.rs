use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ScheduleError;
use crate::extractor::{self, ScheduleDataset};
use crate::health::HealthStatus;
use crate::middleware::{header_str, ClientId};
use crate::rate_limiter::Admission;
use crate::server::AppState;
use crate::url_validator;

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub url: Option<String>,
}

/// `GET /?url=...`: admit, validate, fetch once, extract.
pub async fn get_schedule(
    State(state): State<AppState>,
    ClientId(client): ClientId,
    headers: HeaderMap,
    query: Option<Query<ScheduleQuery>>,
) -> Result<Json<ScheduleDataset>, ScheduleError> {
    if state.enforce_origin() {
        let origin = header_str(&headers, header::ORIGIN);
        let referer = header_str(&headers, header::REFERER);
        if !state.gate().is_allowed(origin, referer) {
            warn!(client = %client, origin, referer, "Rejected request from unlisted origin");
            return Err(ScheduleError::UnauthorizedOrigin);
        }
    }

    admit(&state, &client)?;

    let query = query.map(|Query(query)| query).unwrap_or_default();
    let url = url_validator::validate(query.url.as_deref().unwrap_or_default()).map_err(|e| {
        warn!(client = %client, url = ?query.url, "Rejected url: {}", e);
        e
    })?;

    let html = state.fetcher().fetch(&url).await.map_err(|e| {
        warn!(event = url.event_id(), "Upstream fetch failed: {}", e);
        e
    })?;

    match extractor::extract(&html) {
        Some(dataset) => {
            info!(
                event = url.event_id(),
                participants = dataset.participant_names().len(),
                slots = dataset.time_slots().len(),
                "Extracted schedule"
            );
            Ok(Json(dataset))
        }
        None => {
            warn!(event = url.event_id(), bytes = html.len(), "No scheduling data in page");
            Err(ScheduleError::NoScheduleData)
        }
    }
}

fn admit(state: &AppState, client: &str) -> Result<(), ScheduleError> {
    match state.rate_limiter().admit(client, state.now_millis()) {
        Admission::Allowed { .. } => Ok(()),
        Admission::Rejected { retry_after } => {
            warn!(client = %client, "Rate limit exceeded");
            Err(ScheduleError::RateLimitExceeded {
                retry_after_secs: retry_after.as_millis().div_ceil(1000) as u64,
            })
        }
    }
}

/// CORS preflight. Headers are added by the CORS middleware.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// HEAD would spend rate limit budget and an upstream fetch for nothing.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "GET, OPTIONS")],
    )
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus::from_state(&state))
}
