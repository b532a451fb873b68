//! Readiness probing
//!
//! A [`ReadinessProbe`] performs one lightweight check and answers
//! ready/not-ready. [`wait_until_ready`] polls it on a fixed interval until it
//! answers ready or a deadline passes. Probe errors and "not ready" are the
//! same case; only the deadline fails the run.

use crate::errors::{ReadinessError, Result, SetupError};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace};

/// A single readiness check against a URL
#[allow(async_fn_in_trait)]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self, url: &str) -> bool;
}

/// HTTP HEAD probe expecting one specific status code
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    ready_status: StatusCode,
}

impl HttpProbe {
    /// Create a probe whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration, ready_status: u16) -> Result<Self> {
        let ready_status = StatusCode::from_u16(ready_status).map_err(|e| SetupError::Probe {
            message: e.to_string(),
        })?;
        // No pooling: a harness may be shared by tests that each own a runtime
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| SetupError::Probe {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            ready_status,
        })
    }
}

impl ReadinessProbe for HttpProbe {
    async fn check(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                trace!("Probe {} answered {}", url, response.status());
                response.status() == self.ready_status
            }
            Err(e) => {
                trace!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Outcome of a successful readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Number of probe checks made, including the successful one
    pub attempts: u32,
    /// Time from the first check until readiness
    pub elapsed: Duration,
}

/// Poll `probe` every `interval` until ready, failing once `timeout` has passed
///
/// The first check happens immediately, so an already-ready application never
/// waits for an interval.
#[instrument(skip(probe))]
pub async fn wait_until_ready<P: ReadinessProbe>(
    probe: &P,
    url: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<ReadinessReport> {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe.check(url).await {
            let elapsed = start.elapsed();
            info!("{} ready after {} attempt(s) in {:?}", url, attempts, elapsed);
            return Ok(ReadinessReport { attempts, elapsed });
        }

        let elapsed = start.elapsed();
        if elapsed > timeout {
            return Err(ReadinessError::Timeout {
                url: url.to_string(),
                waited: elapsed,
            }
            .into());
        }

        debug!("{} not ready (attempt {})", url, attempts);
        tokio::time::sleep(interval).await;
    }
}
