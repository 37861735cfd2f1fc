use crate::error::Result;
use crate::validate::{MetricSample, Unit};
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Gauge-per-name registry backing the apply path.
///
/// Names are canonicalized before storage; `a.b` and `a-b` both map to `a_b`,
/// and the later write wins. Entries are created on first sight and mutated
/// in place afterwards; there is no delete operation.
pub struct GaugeRegistry {
    registry: Registry,
    gauges: RwLock<HashMap<String, Gauge>>,
}

/// Replaces `.` and `-` with `_` so the stored name satisfies the
/// `^[A-Za-z_:][A-Za-z0-9_:]*$` exposition pattern.
pub fn canonical_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Applies a batch of samples, returning how many were stored.
    ///
    /// Per-sample best effort: a sample with a non-finite value, or one whose
    /// gauge cannot be created, is skipped with a log line rather than
    /// failing the batch. The value check is a defensive second line behind
    /// the validator, since trusted producers call this path directly.
    pub async fn set_all(&self, samples: &[MetricSample]) -> usize {
        let mut gauges = self.gauges.write().await;
        let mut applied = 0;

        for sample in samples {
            if !sample.value.is_finite() {
                warn!("Skipping {}: value must be a finite number", sample.name);
                continue;
            }

            let name = canonical_name(&sample.name);
            if !gauges.contains_key(&name) {
                match self.register_gauge(&name, &sample.name, sample.unit) {
                    Ok(gauge) => {
                        gauges.insert(name.clone(), gauge);
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", sample.name, e);
                        continue;
                    }
                }
            }

            if let Some(gauge) = gauges.get(&name) {
                gauge.set(sample.value);
                applied += 1;
                info!(
                    "Metric set: {} = {} {}",
                    name,
                    sample.value,
                    sample.unit.as_str()
                );
            }
        }

        applied
    }

    fn register_gauge(&self, name: &str, original: &str, unit: Unit) -> Result<Gauge> {
        let help = if unit == Unit::None {
            format!("Simulated metric: {}", original)
        } else {
            format!("Simulated metric: {} ({})", original, unit.as_str())
        };

        let gauge = Gauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Renders the current registry in the text exposition format.
    pub async fn snapshot(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| anyhow::anyhow!(e).into())
    }

    pub async fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gauges.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.gauges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.gauges.read().await.is_empty()
    }
}

impl Default for GaugeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
