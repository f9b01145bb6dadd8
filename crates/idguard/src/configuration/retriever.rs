use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ConfigurationError;

/// Fetches a configuration from a metadata address
#[async_trait]
pub trait ConfigurationRetriever<C>: Send + Sync {
    /// Fetch and parse the configuration at `address`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the address cannot be fetched or
    /// the document cannot be parsed.
    async fn get_configuration(
        &self,
        address: &str,
        cancellation: &CancellationToken,
    ) -> Result<C, ConfigurationError>;
}

/// Accepts or rejects a freshly retrieved configuration before it is published
pub trait ConfigurationValidator<C>: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ValidationFailed`] describing why the
    /// configuration is unusable.
    fn validate(&self, configuration: &C) -> Result<(), ConfigurationError>;
}
