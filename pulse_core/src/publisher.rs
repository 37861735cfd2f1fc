use crate::error::{PulseError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub const PUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Sink for registry snapshots. The gateway implementation is the production
/// path; tests substitute an in-memory recorder.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Submits one exposition-format snapshot. No retries; retrying is a
    /// caller concern.
    async fn push(&self, exposition: String) -> Result<()>;

    /// Lightweight reachability check, for health reporting only.
    async fn probe(&self) -> bool;

    fn endpoint(&self) -> &str;

    fn job(&self) -> &str;
}

/// Pushes snapshots to a Prometheus push gateway over HTTP.
pub struct GatewayPublisher {
    client: reqwest::Client,
    gateway_url: String,
    job: String,
}

impl GatewayPublisher {
    pub fn new(gateway_url: impl Into<String>, job: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            job: job.into(),
        })
    }

    fn push_url(&self) -> String {
        format!("{}/metrics/job/{}", self.gateway_url, self.job)
    }

    fn probe_url(&self) -> String {
        format!("{}/metrics", self.gateway_url)
    }
}

#[async_trait]
impl Publisher for GatewayPublisher {
    async fn push(&self, exposition: String) -> Result<()> {
        let response = self
            .client
            .put(self.push_url())
            .header(reqwest::header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
            .body(exposition)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    PulseError::GatewayUnreachable {
                        url: self.gateway_url.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    PulseError::GatewayRejected(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::GatewayRejected(format!(
                "gateway returned status {}",
                status
            )));
        }

        debug!("Pushed snapshot to {}", self.push_url());
        Ok(())
    }

    async fn probe(&self) -> bool {
        match self
            .client
            .get(self.probe_url())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Gateway probe failed for {}: {}", self.gateway_url, e);
                false
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.gateway_url
    }

    fn job(&self) -> &str {
        &self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url_shape() {
        let publisher = GatewayPublisher::new("http://pushgateway:9091/", "metrics_simulator")
            .unwrap();

        assert_eq!(publisher.endpoint(), "http://pushgateway:9091");
        assert_eq!(
            publisher.push_url(),
            "http://pushgateway:9091/metrics/job/metrics_simulator"
        );
        assert_eq!(publisher.probe_url(), "http://pushgateway:9091/metrics");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_connectivity_failure() {
        // Nothing listens on port 1; the connection is refused immediately.
        let publisher = GatewayPublisher::new("http://127.0.0.1:1", "test_job").unwrap();

        let err = publisher.push("metric_a 1\n".to_string()).await.unwrap_err();
        assert!(err.is_connectivity(), "expected connectivity error, got: {}", err);
        assert!(err.to_string().contains("Cannot connect to push gateway"));

        assert!(!publisher.probe().await);
    }
}
