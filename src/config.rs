use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::access_gate::{AccessGate, DEFAULT_ALLOWED_ORIGINS};
use crate::error::ScheduleError;
use crate::rate_limiter::RateLimitPolicy;

#[derive(Debug, Parser)]
#[command(name = "when2solve", version, about = "Serve When2Meet scheduling data as JSON")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Extract scheduling data from a saved page and print it as JSON
    Extract {
        /// Path to the saved HTML page
        file: PathBuf,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Args, Validate)]
#[validate(schema(function = "validate_origins"))]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8787")]
    pub bind_addr: SocketAddr,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Comma-separated origin prefixes allowed to call the service
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_values_t = DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect::<Vec<_>>())]
    pub allowed_origins: Vec<String>,

    /// Reject requests whose Origin and Referer are both outside the allow-list
    #[arg(long, env = "ENFORCE_ORIGIN", default_value_t = true, action = clap::ArgAction::Set)]
    pub enforce_origin: bool,

    /// Requests admitted per client per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 30)]
    #[validate(range(min = 1))]
    pub rate_limit: u64,

    /// Length of the rate limit window
    #[arg(long, env = "RATE_WINDOW", default_value = "60s", value_parser = parse_duration)]
    pub rate_window: Duration,

    /// Upper bound on the upstream page fetch
    #[arg(long, env = "FETCH_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub fetch_timeout: Duration,

    /// How often expired rate limit entries are swept
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "5m", value_parser = parse_duration)]
    pub cleanup_interval: Duration,
}

fn validate_origins(config: &Config) -> Result<(), ValidationError> {
    if config.enforce_origin && config.allowed_origins.iter().all(|o| o.trim().is_empty()) {
        return Err(ValidationError::new("allowed_origins")
            .with_message("at least one allowed origin is required when ENFORCE_ORIGIN is on".into()));
    }
    if config.rate_window.is_zero() || config.fetch_timeout.is_zero() || config.cleanup_interval.is_zero() {
        return Err(ValidationError::new("durations")
            .with_message("durations must be greater than zero".into()));
    }
    Ok(())
}

impl Config {
    /// Validate the parsed configuration.
    pub fn check(&self) -> Result<(), ScheduleError> {
        self.validate()
            .map_err(|e| ScheduleError::Configuration(e.to_string()))
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            limit: self.rate_limit,
            window: self.rate_window,
        }
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(self.allowed_origins.iter().map(|o| o.trim().to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8787)),
            log_level: "info".to_string(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            enforce_origin: true,
            rate_limit: 30,
            rate_window: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}
