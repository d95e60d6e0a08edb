//! # Sample Upload
//!
//! Posts samples to the ingestion function
//! `{base_url}/functions/v1/insert-sample` with a bearer key.
//!
//! ## Retry Policy
//!
//! A failed attempt (transport error or non-2xx status) is retried after
//! `base_backoff * 2^attempt`: 2 s, 4 s, 8 s, 16 s with the defaults. After
//! the last attempt the sample is dropped; it is still in the CSV log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::TelemetrySample;
use crate::config::TelemetryConfig;
use crate::error::{AquasenseError, Result};

/// Path of the ingestion function, relative to the base URL
pub const INSERT_SAMPLE_PATH: &str = "/functions/v1/insert-sample";

/// How often and how patiently an upload is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Delivers one sample to the remote store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SampleTransport: Send + Sync {
    /// Send once, without retrying.
    ///
    /// # Errors
    ///
    /// Returns `Upload` on a transport error or a non-success status.
    async fn send(&self, sample: &TelemetrySample) -> Result<()>;
}

/// `reqwest` transport posting JSON to the ingestion function.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    anon_key: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `Upload` if the HTTP client cannot be built.
    pub fn new(base_url: &str, anon_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AquasenseError::Upload(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), INSERT_SAMPLE_PATH),
            anon_key: anon_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SampleTransport for HttpTransport {
    async fn send(&self, sample: &TelemetrySample) -> Result<()> {
        self.client
            .post(&self.url)
            .bearer_auth(&self.anon_key)
            .json(sample)
            .send()
            .await
            .map_err(|e| AquasenseError::Upload(format!("Request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AquasenseError::Upload(format!("Rejected by server: {}", e)))?;
        Ok(())
    }
}

/// Sends samples through a transport, retrying with exponential backoff.
#[derive(Clone)]
pub struct Uploader {
    transport: Arc<dyn SampleTransport>,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(transport: Arc<dyn SampleTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// HTTP uploader configured from the `[telemetry]` section
    ///
    /// # Errors
    ///
    /// Returns `Upload` if the HTTP client cannot be built.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.anon_key.clone(),
            Duration::from_secs(config.request_timeout_s),
        )?;
        info!("Uploading samples to {}", transport.url());

        let policy = RetryPolicy {
            max_attempts: config.max_retries,
            base_backoff: Duration::from_secs(config.base_backoff_s),
        };
        Ok(Self::new(Arc::new(transport), policy))
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upload `sample`, returning the number of attempts it took.
    ///
    /// # Errors
    ///
    /// Returns `Upload` once every attempt has failed.
    pub async fn upload(&self, sample: &TelemetrySample) -> Result<u32> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match self.transport.send(sample).await {
                Ok(()) => {
                    info!("Sample sent at {}", sample.measured_at.to_rfc3339());
                    return Ok(attempt + 1);
                }
                Err(e) if attempt + 1 < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "Send failed: {}. Retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Send failed: {}. Max retries reached, giving up", e);
                    return Err(AquasenseError::Upload(format!(
                        "Gave up after {} attempts: {}",
                        max_attempts, e
                    )));
                }
            }
        }

        Err(AquasenseError::Upload("No upload attempt made".to_string()))
    }
}
