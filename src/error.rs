use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScheduleError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Unauthorized origin")]
    UnauthorizedOrigin,

    #[error("Rate limit exceeded. Try again in a minute.")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Missing ?url= parameter")]
    MissingUrl,

    #[error("Not a valid When2Meet URL")]
    InvalidUrl,

    #[error("When2Meet returned {0}")]
    UpstreamStatus(u16),

    #[error("Failed to fetch When2Meet page: {0}")]
    UpstreamFetch(String),

    #[error("Could not parse scheduling data from this page")]
    NoScheduleData,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScheduleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::UnauthorizedOrigin => StatusCode::FORBIDDEN,
            ScheduleError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ScheduleError::MissingUrl | ScheduleError::InvalidUrl => StatusCode::BAD_REQUEST,
            ScheduleError::UpstreamStatus(_) | ScheduleError::UpstreamFetch(_) => {
                StatusCode::BAD_GATEWAY
            }
            ScheduleError::NoScheduleData => StatusCode::UNPROCESSABLE_ENTITY,
            ScheduleError::Configuration(_) | ScheduleError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for ScheduleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScheduleError::UpstreamFetch("request timed out".to_string())
        } else {
            ScheduleError::UpstreamFetch(err.to_string())
        }
    }
}

/// JSON body written for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ScheduleError {
    fn into_response(self) -> Response {
        // Internal detail stays in the logs
        let message = match &self {
            ScheduleError::Configuration(_) | ScheduleError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (self.status_code(), Json(ErrorResponse { error: message })).into_response();

        if let ScheduleError::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
