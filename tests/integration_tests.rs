use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use when2solve::{
    error::ScheduleError,
    fetcher::PageFetcher,
    rate_limiter::{ManualClock, RateLimitPolicy, RateLimiter},
    url_validator::EventUrl,
    AccessGate, AppState, create_app,
};

const FIXTURE: &str = include_str!("fixtures/event.html");
const EVENT_URL: &str = "https://when2meet.com/?12345-abcDE";
const START: u64 = 1_700_000_000_000;

struct CannedFetcher {
    page: Result<String, ScheduleError>,
    calls: AtomicUsize,
}

impl CannedFetcher {
    fn page(html: &str) -> Arc<Self> {
        Arc::new(Self {
            page: Ok(html.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(err: ScheduleError) -> Arc<Self> {
        Arc::new(Self {
            page: Err(err),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for CannedFetcher {
    async fn fetch(&self, _url: &EventUrl) -> Result<String, ScheduleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page.clone()
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    clock: Arc<ManualClock>,
}

fn test_app(fetcher: Arc<CannedFetcher>, enforce_origin: bool, limit: u64) -> TestApp {
    let clock = Arc::new(ManualClock::new(START));
    let state = AppState::new(
        AccessGate::default(),
        enforce_origin,
        RateLimiter::new(RateLimitPolicy {
            limit,
            window: Duration::from_secs(60),
        }),
        clock.clone(),
        fetcher,
    );

    TestApp {
        router: create_app(state.clone()),
        state,
        clock,
    }
}

fn schedule_request(url: Option<&str>, origin: Option<&str>) -> Request<Body> {
    let uri = match url {
        Some(url) => format!("/?url={}", encode(url)),
        None => "/".to_string(),
    };

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("cf-connecting-ip", "198.51.100.20");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::empty()).unwrap()
}

fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_end_to_end_extraction() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 30);

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://bfer.land"
    );
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["v"], 1);
    assert_eq!(body["e"], "Project Kickoff");
    assert_eq!(body["n"], serde_json::json!(["Alice Chen", "Bob"]));
    assert_eq!(body["i"], serde_json::json!([81234501, 81234502]));
    assert_eq!(body["t"].as_array().unwrap().len(), 3);
    assert_eq!(body["a"], serde_json::json!([[81234501], [], [81234502]]));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_missing_url_is_bad_request() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 30);

    let response = app
        .router
        .oneshot(schedule_request(None, Some("http://localhost:5173")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Missing ?url= parameter");
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_foreign_url_never_fetched() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 30);

    let response = app
        .router
        .oneshot(schedule_request(
            Some("https://evil.example.com/?12345-abcDE"),
            Some("http://localhost"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Not a valid When2Meet URL");
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_unlisted_origin_forbidden() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 30);

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://evil.example.com")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://bfer.land"
    );
    assert_eq!(json_body(response).await["error"], "Unauthorized origin");
    assert_eq!(fetcher.calls(), 0);
    // rejected before the rate limiter saw it
    assert_eq!(app.state.rate_limiter().tracked_clients(), 0);
}

#[tokio::test]
async fn test_referer_alone_admits() {
    let app = test_app(CannedFetcher::page(FIXTURE), true, 30);

    let request = Request::builder()
        .uri(format!("/?url={}", encode(EVENT_URL)))
        .header(header::REFERER, "https://peekperformer.github.io/when2solve/")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_permissive_variant_skips_gate() {
    let app = test_app(CannedFetcher::page(FIXTURE), false, 30);

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_rate_limit_window() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 2);

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    app.clock.advance(Duration::from_secs(30));
    let response = app
        .router
        .clone()
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "31");
    assert_eq!(
        json_body(response).await["error"],
        "Rate limit exceeded. Try again in a minute."
    );
    assert_eq!(fetcher.calls(), 2);

    app.clock.set(START + 60_001);
    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_status_is_bad_gateway() {
    let app = test_app(CannedFetcher::failing(ScheduleError::UpstreamStatus(404)), true, 30);

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "When2Meet returned 404");
}

#[tokio::test]
async fn test_upstream_network_failure_is_bad_gateway() {
    let app = test_app(
        CannedFetcher::failing(ScheduleError::UpstreamFetch("connection reset".into())),
        true,
        30,
    );

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(response).await["error"],
        "Failed to fetch When2Meet page: connection reset"
    );
}

#[tokio::test]
async fn test_page_without_data_is_unprocessable() {
    let app = test_app(
        CannedFetcher::page("<html><title>Event not found - When2meet</title></html>"),
        true,
        30,
    );

    let response = app
        .router
        .oneshot(schedule_request(Some(EVENT_URL), Some("https://bfer.land")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["error"],
        "Could not parse scheduling data from this page"
    );
}

#[tokio::test]
async fn test_preflight() {
    let app = test_app(CannedFetcher::page(FIXTURE), true, 30);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/")
        .header(header::ORIGIN, "http://127.0.0.1:8000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://127.0.0.1:8000"
    );
    assert_eq!(response.headers()[header::VARY], "Origin");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
    assert_eq!(app.state.rate_limiter().tracked_clients(), 0);
}

#[tokio::test]
async fn test_head_is_rejected_without_fetching() {
    let fetcher = CannedFetcher::page(FIXTURE);
    let app = test_app(fetcher.clone(), true, 30);

    let request = Request::builder()
        .method(Method::HEAD)
        .uri(format!("/?url={}", encode(EVENT_URL)))
        .header(header::ORIGIN, "https://bfer.land")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://bfer.land"
    );
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(app.state.rate_limiter().tracked_clients(), 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(CannedFetcher::page(FIXTURE), true, 30);

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tracked_clients"], 0);
}
