use thiserror::Error;

/// Failures while retrieving, validating or managing configuration
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The metadata address is unusable
    #[error("Invalid metadata address: {0}")]
    InvalidAddress(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Response size limit exceeded
    #[error("Response size limit exceeded")]
    ResponseTooLarge,

    /// Invalid JSON response
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    /// The retrieved configuration was rejected by the configuration validator
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Manager options out of range
    #[error("Invalid configuration manager options: {0}")]
    InvalidOptions(String),

    /// The first fetch failed and no configuration is available
    #[error("Unable to obtain configuration from '{address}': {reason}")]
    RetrievalFailed {
        /// Metadata address
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// Retrieval was cancelled
    #[error("Configuration retrieval was cancelled")]
    Cancelled,
}

impl ConfigurationError {
    /// Short label used in telemetry
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigurationError::InvalidAddress(_) => "invalid_address",
            ConfigurationError::HttpError(_) => "http",
            ConfigurationError::ResponseTooLarge => "response_too_large",
            ConfigurationError::InvalidJson(_) => "invalid_json",
            ConfigurationError::ValidationFailed(_) => "validation_failed",
            ConfigurationError::InvalidOptions(_) => "invalid_options",
            ConfigurationError::RetrievalFailed { .. } => "retrieval_failed",
            ConfigurationError::Cancelled => "cancelled",
        }
    }
}
