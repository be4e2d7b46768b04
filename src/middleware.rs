use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

use crate::server::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_id = client_id(request.headers(), request.extensions());
    let request_id = Uuid::new_v4();

    info!(
        target: "when2solve::middleware",
        %request_id,
        method = %method,
        uri = %uri,
        client_id = %client_id,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    info!(
        target: "when2solve::middleware",
        %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Stamps CORS headers on every response, including errors and preflight.
pub async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = header_str(request.headers(), header::ORIGIN).to_string();

    let mut response = next.run(request).await;

    let allow_origin = if state.enforce_origin() {
        state.gate().cors_origin(&origin).to_string()
    } else {
        "*".to_string()
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&allow_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));

    response
}

/// Header value as text, empty when absent or not visible ASCII.
pub fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Identifier the rate limiter keys on, resolved per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientId(client_id(&parts.headers, &parts.extensions)))
    }
}

/// Edge-provided client address, then proxy headers, then the socket peer.
pub fn client_id(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(ip) = non_empty(header_str(headers, header::HeaderName::from_static("cf-connecting-ip"))) {
        return ip.to_string();
    }

    if let Some(first_ip) = header_str(headers, header::HeaderName::from_static("x-forwarded-for"))
        .split(',')
        .next()
        .and_then(non_empty)
    {
        return first_ip.to_string();
    }

    if let Some(ip) = non_empty(header_str(headers, header::HeaderName::from_static("x-real-ip"))) {
        return ip.to_string();
    }

    // Fallback to connection info
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
