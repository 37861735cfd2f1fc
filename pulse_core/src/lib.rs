pub mod backend;
pub mod config;
pub mod error;
pub mod publisher;
pub mod ratelimit;
pub mod registry;
pub mod simulator;
pub mod validate;

pub use backend::{BackendStatus, MetricsBackend};
pub use config::{Limits, Settings, APPLY_WINDOW, GENERAL_WINDOW};
pub use error::{PulseError, Result};
pub use publisher::{GatewayPublisher, Publisher};
pub use ratelimit::{Decision, FixedWindowLimiter, OpClass, RateLimiters};
pub use registry::GaugeRegistry;
pub use simulator::Simulator;
pub use validate::{ApplyRequest, MetricPayload, MetricSample, Unit, Validator};

// Re-export commonly used types
pub use async_trait::async_trait;
