use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const APPLY_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const GENERAL_WINDOW: Duration = Duration::from_secs(60);

/// Service configuration, read from the environment with documented defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway_url: String,
    pub job_name: String,
    pub environment: String,
    pub debug: bool,
    pub max_metrics_per_request: usize,
    pub min_metric_value: f64,
    pub max_metric_value: f64,
    /// Apply-metrics requests allowed per 15-minute window per client IP.
    pub apply_changes_per_window: u32,
    /// Requests per minute per client IP for all other endpoints.
    pub general_requests_per_minute: u32,
    pub max_request_size: usize,
    pub allowed_origins: Vec<String>,
    pub simulate_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: "http://pushgateway-svc:9091".to_string(),
            job_name: "metrics_simulator".to_string(),
            environment: "production".to_string(),
            debug: false,
            max_metrics_per_request: 50,
            min_metric_value: -1e15,
            max_metric_value: 1e15,
            apply_changes_per_window: 3,
            general_requests_per_minute: 300,
            max_request_size: 1024 * 1024,
            allowed_origins: Vec::new(),
            simulate_interval: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            gateway_url: env_or("PROMETHEUS_GATEWAY_URL", defaults.gateway_url),
            job_name: env_or("METRICS_JOB_NAME", defaults.job_name),
            environment: env_or("ENV", defaults.environment),
            debug: env_parse("DEBUG", defaults.debug),
            max_metrics_per_request: env_parse(
                "MAX_METRICS_PER_REQUEST",
                defaults.max_metrics_per_request,
            ),
            min_metric_value: env_parse("MIN_METRIC_VALUE", defaults.min_metric_value),
            max_metric_value: env_parse("MAX_METRIC_VALUE", defaults.max_metric_value),
            apply_changes_per_window: env_parse(
                "APPLY_CHANGES_PER_15MINUTES",
                defaults.apply_changes_per_window,
            ),
            general_requests_per_minute: env_parse(
                "GENERAL_REQUESTS_PER_MINUTE",
                defaults.general_requests_per_minute,
            ),
            max_request_size: env_parse("MAX_REQUEST_SIZE", defaults.max_request_size),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            simulate_interval: Duration::from_secs(env_parse(
                "SIMULATE_INTERVAL_SECS",
                defaults.simulate_interval.as_secs(),
            )),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_metrics_per_request: self.max_metrics_per_request,
            min_metric_value: self.min_metric_value,
            max_metric_value: self.max_metric_value,
        }
    }
}

/// Validation bounds for incoming apply requests.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_metrics_per_request: usize,
    pub min_metric_value: f64,
    pub max_metric_value: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Settings::default().limits()
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value for {}: {:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.max_metrics_per_request, 50);
        assert_eq!(settings.apply_changes_per_window, 3);
        assert_eq!(settings.general_requests_per_minute, 300);
        assert_eq!(settings.min_metric_value, -1e15);
        assert_eq!(settings.max_metric_value, 1e15);
        assert_eq!(settings.simulate_interval, Duration::from_secs(30));
        assert!(settings.is_production());
    }

    #[test]
    fn test_limits_subset() {
        let limits = Settings::default().limits();

        assert_eq!(limits.max_metrics_per_request, 50);
        assert_eq!(limits.max_metric_value, 1e15);
    }
}
