use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ScheduleError};
use crate::url_validator::EventUrl;

pub const USER_AGENT: &str = "When2Solve/1.0 (scheduling optimizer)";

/// Retrieves the HTML of an event page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &EventUrl) -> Result<String>;
}

/// Single-attempt HTTP fetcher with a hard timeout.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                ScheduleError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// One GET against `url`; non-2xx statuses are errors.
    pub(crate) async fn fetch_url(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScheduleError::UpstreamStatus(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &EventUrl) -> Result<String> {
        debug!(url = %url.as_str(), event = url.event_id(), "Fetching event page");
        self.fetch_url(url.as_str()).await
    }
}
