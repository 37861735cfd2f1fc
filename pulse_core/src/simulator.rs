use crate::backend::MetricsBackend;
use crate::validate::{MetricSample, Unit};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BASE_MEMORY_BYTES: f64 = 134_217_728.0; // ~128MB
const BASE_CPU_SECONDS: f64 = 1200.5;
const BASE_HTTP_DURATION: f64 = 0.250;

/// Builds one round of plausible system metrics with bounded jitter around
/// the baselines.
pub fn synth_samples<R: Rng>(rng: &mut R) -> Vec<MetricSample> {
    vec![
        MetricSample::new(
            "process_memory_bytes",
            BASE_MEMORY_BYTES + rng.gen_range(-10_000_000.0..=20_000_000.0),
            Unit::Bytes,
        ),
        MetricSample::new(
            "cpu_seconds_total",
            BASE_CPU_SECONDS + rng.gen_range(0.0..10.0),
            Unit::Seconds,
        ),
        MetricSample::new(
            "http_request_duration_seconds",
            (BASE_HTTP_DURATION + rng.gen_range(-0.1..0.2)).max(0.001),
            Unit::Seconds,
        ),
    ]
}

/// Periodic producer of synthetic metrics.
///
/// A trusted internal producer: it drives the backend's apply path directly,
/// bypassing HTTP validation and rate limiting. A failed apply on one tick is
/// logged and never stops the next.
pub struct Simulator {
    backend: Arc<MetricsBackend>,
    interval: Duration,
}

impl Simulator {
    pub fn new(backend: Arc<MetricsBackend>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Starts the tick loop. The first round fires immediately; the loop runs
    /// until the token is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Simulator started, sending metrics every {}",
                humantime::format_duration(self.interval)
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Simulator stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }

    async fn tick(&self) {
        let samples = synth_samples(&mut rand::thread_rng());

        info!("Simulating {} metrics", samples.len());
        match self.backend.apply(&samples).await {
            Ok(message) => info!("{}", message),
            Err(e) => warn!("Simulated apply failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_synth_samples_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let samples = synth_samples(&mut rng);
            assert_eq!(samples.len(), 3);

            let memory = &samples[0];
            assert_eq!(memory.name, "process_memory_bytes");
            assert_eq!(memory.unit, Unit::Bytes);
            assert!(memory.value >= BASE_MEMORY_BYTES - 10_000_000.0);
            assert!(memory.value <= BASE_MEMORY_BYTES + 20_000_000.0);

            let cpu = &samples[1];
            assert_eq!(cpu.name, "cpu_seconds_total");
            assert!(cpu.value >= BASE_CPU_SECONDS);
            assert!(cpu.value < BASE_CPU_SECONDS + 10.0);

            let duration = &samples[2];
            assert_eq!(duration.name, "http_request_duration_seconds");
            assert!(duration.value >= 0.001);
            assert!(duration.value < BASE_HTTP_DURATION + 0.2);
        }
    }

    #[test]
    fn test_synth_samples_are_valid_without_the_validator() {
        // The simulator bypasses HTTP validation, so whatever it produces
        // must already satisfy the registry's expectations.
        let mut rng = StdRng::seed_from_u64(7);
        for sample in synth_samples(&mut rng) {
            assert!(sample.value.is_finite());
            assert_eq!(sample.name, crate::registry::canonical_name(&sample.name));
        }
    }
}
