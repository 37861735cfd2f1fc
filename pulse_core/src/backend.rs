use crate::error::Result;
use crate::publisher::Publisher;
use crate::registry::GaugeRegistry;
use crate::validate::MetricSample;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub prometheus_gateway_url: String,
    pub job_name: String,
    pub total_metrics: usize,
    pub metric_names: Vec<String>,
    pub healthy: bool,
}

/// The registry plus its push sink, behind the one apply contract every
/// producer (HTTP handler or simulator) goes through.
pub struct MetricsBackend {
    registry: GaugeRegistry,
    publisher: Arc<dyn Publisher>,
}

impl MetricsBackend {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            registry: GaugeRegistry::new(),
            publisher,
        }
    }

    /// Applies a batch and pushes the resulting snapshot.
    ///
    /// Registry mutation and push success are not transactionally linked: a
    /// failed push surfaces as an error here, but the gauges keep the values
    /// just written. Callers that need consistency must treat the error as
    /// "publish pending", not "nothing happened".
    pub async fn apply(&self, samples: &[MetricSample]) -> Result<String> {
        let applied = self.registry.set_all(samples).await;

        info!(
            "Pushing {} metric(s) to {}",
            applied,
            self.publisher.endpoint()
        );
        let exposition = self.registry.snapshot().await?;
        self.publisher.push(exposition).await?;

        Ok(format!("{} metric(s) pushed to gateway", applied))
    }

    /// Exposition-format view of the internal registry, without pushing.
    pub async fn snapshot(&self) -> Result<String> {
        self.registry.snapshot().await
    }

    pub async fn probe(&self) -> bool {
        self.publisher.probe().await
    }

    pub async fn status(&self) -> BackendStatus {
        BackendStatus {
            prometheus_gateway_url: self.publisher.endpoint().to_string(),
            job_name: self.publisher.job().to_string(),
            total_metrics: self.registry.len().await,
            metric_names: self.registry.metric_names().await,
            healthy: self.probe().await,
        }
    }

    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }
}
