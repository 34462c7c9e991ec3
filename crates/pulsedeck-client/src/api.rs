//! Request/response client for the metrics data API.
//!
//! The backend serves dashboard-wide and per-host aggregates over plain
//! HTTP; transient transport failures are retried a bounded number of times
//! before surfacing.

use std::time::Duration;

use tracing::debug;

use pulsedeck_core::error::ApiError;
use pulsedeck_types::{HostMetrics, SystemOverview};

/// Configuration for the data API client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Origin of the metrics backend, e.g. `https://metrics.example.com`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per logical request (1 = no retry).
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// HTTP client for the metrics API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Dashboard overview: one summary row per known host.
    pub async fn system_overview(&self) -> Result<SystemOverview, ApiError> {
        self.get_json("api/system/", &[]).await
    }

    /// Every hostname that has ever reported.
    pub async fn system_hostnames(&self) -> Result<Vec<String>, ApiError> {
        self.get_json("api/system/hostnames/", &[]).await
    }

    /// Aggregated metrics and chart timeline for one host over a window.
    pub async fn host_metrics(
        &self,
        hostname: &str,
        hours: u32,
    ) -> Result<HostMetrics, ApiError> {
        self.get_json(
            "api/system/",
            &[
                ("hostname", hostname.to_string()),
                ("hours", hours.to_string()),
            ],
        )
        .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = join_url(&self.config.base_url, path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.http.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        // The server answered; retrying will not change its mind.
                        return Err(ApiError::Status(status.as_u16()));
                    }
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| ApiError::Decode(e.to_string()));
                }
                Err(err) if attempt < self.config.max_attempts => {
                    debug!(url = %url, attempt, error = %err, "request failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(err) => return Err(ApiError::Http(err.to_string())),
            }
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
