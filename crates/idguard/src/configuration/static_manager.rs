use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{BaseConfigurationManager, Configuration, ConfigurationError};

/// Serves one fixed configuration; refresh requests are ignored and there is
/// no last-known-good history
///
/// Useful for issuers whose keys are provisioned out of band, and in tests.
///
/// ```rust
/// use idguard::configuration::{
///     BaseConfigurationManager, Configuration, OpenIdConnectConfiguration,
///     StaticConfigurationManager,
/// };
/// use idguard::keys::SigningKey;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let manager = StaticConfigurationManager::new(
///     OpenIdConnectConfiguration::new("https://login.example.com")
///         .with_signing_key(SigningKey::symmetric(b"secret".to_vec())),
/// );
/// let configuration = manager
///     .get_base_configuration(&CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(configuration.issuer(), Some("https://login.example.com"));
/// assert!(manager.last_known_good_configuration().is_none());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StaticConfigurationManager {
    metadata_address: String,
    configuration: Arc<dyn Configuration>,
}

impl StaticConfigurationManager {
    /// Wrap `configuration`
    pub fn new(configuration: impl Configuration) -> Self {
        Self::from_arc(Arc::new(configuration))
    }

    /// Wrap an already shared configuration
    pub fn from_arc(configuration: Arc<dyn Configuration>) -> Self {
        Self {
            metadata_address: "static".to_string(),
            configuration,
        }
    }

    /// Name reported as the metadata address
    pub fn with_metadata_address(mut self, address: impl Into<String>) -> Self {
        self.metadata_address = address.into();
        self
    }

    /// The served configuration
    pub fn configuration(&self) -> &Arc<dyn Configuration> {
        &self.configuration
    }
}

#[async_trait]
impl BaseConfigurationManager for StaticConfigurationManager {
    fn metadata_address(&self) -> &str {
        &self.metadata_address
    }

    async fn get_base_configuration(
        &self,
        _cancellation: &CancellationToken,
    ) -> Result<Arc<dyn Configuration>, ConfigurationError> {
        Ok(Arc::clone(&self.configuration))
    }

    fn request_refresh(&self) {}

    fn use_last_known_good_configuration(&self) -> bool {
        false
    }

    fn last_known_good_configuration(&self) -> Option<Arc<dyn Configuration>> {
        None
    }

    fn last_known_good_configurations(&self) -> Vec<Arc<dyn Configuration>> {
        Vec::new()
    }

    fn set_last_known_good(&self, _configuration: Arc<dyn Configuration>) {}
}
