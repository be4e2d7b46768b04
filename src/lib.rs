pub mod access_gate;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod rate_limiter;
pub mod server;
pub mod url_validator;

pub use access_gate::AccessGate;
pub use config::Config;
pub use error::{Result, ScheduleError};
pub use extractor::{extract, ScheduleDataset};
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
pub use server::{create_app, AppState, Server};
