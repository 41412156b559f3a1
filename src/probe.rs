//! Health probes
//!
//! A probe maps a [`Target`] to a [`ProbeOutcome`] and never fails: timeouts,
//! refused connections and non-2xx answers are all failed outcomes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, trace};

use crate::actors::messages::ProbeOutcome;
use crate::config::{HttpMethod, Target};

/// Issues a single health check against a target
///
/// Implementations hold no mutable state so one instance can be shared by
/// every scheduler.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target) -> ProbeOutcome;
}

/// HTTP(S) prober backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("site-monitoring/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    #[instrument(skip_all, fields(url = %target.url))]
    async fn probe(&self, target: &Target) -> ProbeOutcome {
        let method = match target.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let response = self
            .client
            .request(method, &target.url)
            .timeout(target.timeout)
            .send()
            .await;
        let latency = start.elapsed();

        let outcome = match response {
            Ok(response) => {
                let status = response.status();
                trace!("received {status} after {latency:?}");

                if status.is_success() {
                    ProbeOutcome::succeeded(&target.url, status.as_u16(), latency)
                } else {
                    ProbeOutcome::unexpected_status(&target.url, status.as_u16(), latency)
                }
            }
            Err(e) => {
                trace!("request failed after {latency:?}: {e}");
                ProbeOutcome::transport_failure(&target.url, latency, describe_error(&e, target.timeout))
            }
        };

        ProbeOutcome {
            timestamp: started_at,
            ..outcome
        }
    }
}

fn describe_error(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        format!("request timed out after {}ms", timeout.as_millis())
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
