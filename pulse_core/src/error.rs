use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("{0}")]
    Validation(String),

    #[error("Cannot connect to push gateway at {url}: {reason}")]
    GatewayUnreachable { url: String, reason: String },

    #[error("Push gateway rejected metrics: {0}")]
    GatewayRejected(String),

    #[error("Metrics encoding failed: {0}")]
    Encoding(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PulseError {
    /// True when the failure is the gateway being unreachable rather than a
    /// malformed payload or an internal fault.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PulseError::GatewayUnreachable { .. })
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;
