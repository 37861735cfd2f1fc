use crate::config::Limits;
use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_METRIC_NAME_LEN: usize = 200;

/// How far a client-supplied timestamp may lag behind server time.
pub const TIMESTAMP_MAX_AGE_MS: i64 = 86_400_000;
/// How far a client-supplied timestamp may run ahead of server time.
pub const TIMESTAMP_MAX_SKEW_MS: i64 = 3_600_000;

/// Current server time in milliseconds since the epoch, the reference point
/// for timestamp validation.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    None,
    Bytes,
    Seconds,
    Millis,
    Percent,
    Count,
    Requests,
    Errors,
}

impl Unit {
    pub const ALLOWED: [&'static str; 8] =
        ["", "bytes", "s", "ms", "%", "count", "requests", "errors"];

    pub fn parse(tag: &str) -> Option<Unit> {
        match tag {
            "" => Some(Unit::None),
            "bytes" => Some(Unit::Bytes),
            "s" => Some(Unit::Seconds),
            "ms" => Some(Unit::Millis),
            "%" => Some(Unit::Percent),
            "count" => Some(Unit::Count),
            "requests" => Some(Unit::Requests),
            "errors" => Some(Unit::Errors),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Bytes => "bytes",
            Unit::Seconds => "s",
            Unit::Millis => "ms",
            Unit::Percent => "%",
            Unit::Count => "count",
            Unit::Requests => "requests",
            Unit::Errors => "errors",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricPayload {
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplyRequest {
    pub metrics: HashMap<String, MetricPayload>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A single metric update that has passed validation (or was produced by a
/// trusted internal source such as the simulator).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub unit: Unit,
    pub timestamp_ms: Option<i64>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, unit: Unit) -> Self {
        Self {
            name: name.into(),
            value,
            unit,
            timestamp_ms: None,
        }
    }
}

/// Validates raw apply requests against the configured bounds.
///
/// Validation is all-or-nothing: the first offending field rejects the entire
/// batch, before any registry mutation takes place.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: Limits,
}

impl Validator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, request: &ApplyRequest, now_ms: i64) -> Result<Vec<MetricSample>> {
        if request.metrics.is_empty() {
            return Err(PulseError::Validation(
                "At least one metric is required".to_string(),
            ));
        }
        if request.metrics.len() > self.limits.max_metrics_per_request {
            return Err(PulseError::Validation(format!(
                "Too many metrics. Maximum allowed: {}",
                self.limits.max_metrics_per_request
            )));
        }

        let mut samples = Vec::with_capacity(request.metrics.len());
        for (name, payload) in &request.metrics {
            validate_name(name)?;

            let value = payload.value;
            if !value.is_finite()
                || value < self.limits.min_metric_value
                || value > self.limits.max_metric_value
            {
                return Err(PulseError::Validation(format!(
                    "Metric '{}': value must be between {:e} and {:e}",
                    name, self.limits.min_metric_value, self.limits.max_metric_value
                )));
            }

            let unit = match payload.unit.as_deref() {
                None => Unit::None,
                Some(tag) => Unit::parse(tag).ok_or_else(|| {
                    PulseError::Validation(format!(
                        "Metric '{}': unit must be one of: {:?}",
                        name,
                        Unit::ALLOWED
                    ))
                })?,
            };

            let timestamp = payload.timestamp.or(request.timestamp);
            if let Some(ts) = timestamp {
                if ts < now_ms - TIMESTAMP_MAX_AGE_MS || ts > now_ms + TIMESTAMP_MAX_SKEW_MS {
                    return Err(PulseError::Validation(format!(
                        "Metric '{}': timestamp is too old or too far in the future",
                        name
                    )));
                }
            }

            samples.push(MetricSample {
                name: name.clone(),
                value,
                unit,
                timestamp_ms: Some(timestamp.unwrap_or(now_ms)),
            });
        }

        Ok(samples)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PulseError::Validation(
            "Metric name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_METRIC_NAME_LEN {
        return Err(PulseError::Validation(format!(
            "Metric name too long (max {} chars): {}",
            MAX_METRIC_NAME_LEN, name
        )));
    }
    if !is_valid_metric_name(name) {
        return Err(PulseError::Validation(format!(
            "Invalid metric name format: {}. Must start with letter/underscore \
             and contain only letters, numbers, underscores, and colons.",
            name
        )));
    }
    Ok(())
}

/// `^[A-Za-z_:][A-Za-z0-9_:]*$`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
