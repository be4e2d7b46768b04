use crate::access_gate::AccessGate;
use crate::config::Config;
use crate::error::{Result, ScheduleError};
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::handlers::{get_schedule, health_check, method_not_allowed, preflight};
use crate::middleware::{cors_middleware, logging_middleware};
use crate::rate_limiter::{Clock, RateLimiter, SystemClock};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Everything a request handler needs, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    gate: AccessGate,
    enforce_origin: bool,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn PageFetcher>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        gate: AccessGate,
        enforce_origin: bool,
        rate_limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                gate,
                enforce_origin,
                rate_limiter,
                clock,
                fetcher,
                started_at: Instant::now(),
            }),
        }
    }

    /// Production wiring: system clock and a real HTTP fetcher.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::new(
            config.access_gate(),
            config.enforce_origin,
            RateLimiter::new(config.rate_limit_policy()),
            Arc::new(SystemClock),
            Arc::new(fetcher),
        ))
    }

    pub fn gate(&self) -> &AccessGate {
        &self.inner.gate
    }

    pub fn enforce_origin(&self) -> bool {
        self.inner.enforce_origin
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn now_millis(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    pub fn fetcher(&self) -> &dyn PageFetcher {
        self.inner.fetcher.as_ref()
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        // axum answers HEAD with the GET handler unless told otherwise
        .route("/", get(get_schedule).head(method_not_allowed).options(preflight))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(state.clone(), cors_middleware)),
        )
        .with_state(state)
}

pub struct Server {
    state: AppState,
    bind_addr: SocketAddr,
    cleanup_interval: Duration,
}

impl Server {
    pub fn new(config: &Config) -> Result<Self> {
        config.check()?;

        Ok(Self {
            state: AppState::from_config(config)?,
            bind_addr: config.bind_addr,
            cleanup_interval: config.cleanup_interval,
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| ScheduleError::Configuration(format!("Failed to bind {}: {}", self.bind_addr, e)))?;

        tracing::info!("when2solve listening on {}", self.bind_addr);
        tracing::info!(
            enforce_origin = self.state.enforce_origin(),
            allowed_origins = ?self.state.gate().allowed_origins(),
            limit = self.state.rate_limiter().policy().limit,
            window = ?self.state.rate_limiter().policy().window,
            "Admission policy"
        );

        let sweeper = tokio::spawn(sweep_rate_limits(self.state.clone(), self.cleanup_interval));

        let app = create_app(self.state);
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ScheduleError::Internal(format!("Server error: {}", e)));

        sweeper.abort();
        result
    }
}

/// Periodically drop rate limit entries whose window has closed.
async fn sweep_rate_limits(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let removed = state.rate_limiter().cleanup_expired(state.now_millis());
        if removed > 0 {
            tracing::debug!(removed, remaining = state.rate_limiter().tracked_clients(), "Swept expired rate limit entries");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
