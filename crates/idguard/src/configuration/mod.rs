//! Issuer configuration: retrieval, caching and refresh
//!
//! A [`ConfigurationManager`] owns the issuer metadata (issuer name and
//! signing keys) that token validation runs against. It fetches the metadata
//! through a [`ConfigurationRetriever`], serves it from cache until it goes
//! stale, refreshes it in the background, and keeps a bounded history of
//! configurations that recently validated tokens ("last known good").
//!
//! # Refresh schedule
//!
//! - fresh (`now < sync_after`): served from cache, no I/O
//! - never fetched: one caller fetches, concurrent callers wait for it
//! - stale after [`ConfigurationManager::request_refresh`]: refreshed inline
//! - stale otherwise: refreshed on a background task while the stale value is served
//!
//! A failed refresh keeps the previous configuration. Only a failed first
//! fetch is reported to the caller.

mod error;
mod last_known_good;
mod manager;
mod oidc;
mod options;
mod retriever;
mod static_manager;
mod telemetry;

pub use error::ConfigurationError;
pub use manager::{ConfigurationManager, ConfigurationManagerBuilder};
pub use oidc::{
    OpenIdConnectConfiguration, OpenIdConnectConfigurationRetriever,
    OpenIdConnectConfigurationValidator,
};
pub use options::{
    ConfigurationManagerOptions, DEFAULT_AUTOMATIC_REFRESH_INTERVAL,
    DEFAULT_LAST_KNOWN_GOOD_LIFETIME, DEFAULT_LAST_KNOWN_GOOD_SIZE_LIMIT,
    DEFAULT_REFRESH_INTERVAL, MINIMUM_AUTOMATIC_REFRESH_INTERVAL, MINIMUM_REFRESH_INTERVAL,
};
pub use retriever::{ConfigurationRetriever, ConfigurationValidator};
pub use static_manager::StaticConfigurationManager;
pub use telemetry::{ConfigurationTelemetry, MetricsTelemetry, RefreshStatus};

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::keys::SigningKey;

/// Issuer metadata a token is validated against
pub trait Configuration: Any + Send + Sync + Debug {
    /// Issuer name, compared with the token's issuer
    fn issuer(&self) -> Option<&str>;

    /// Keys the issuer signs with
    fn signing_keys(&self) -> &[SigningKey];
}

/// Type-erased view of a configuration manager, as used by the token handlers
#[async_trait]
pub trait BaseConfigurationManager: Send + Sync + Debug {
    /// Where the metadata is fetched from
    fn metadata_address(&self) -> &str;

    /// Current configuration, fetching or refreshing as the schedule requires
    ///
    /// `cancellation` only abandons waiting for the first fetch; fetches
    /// themselves are never cancelled by a caller.
    ///
    /// # Errors
    ///
    /// Returns an error when no configuration has ever been obtained and the
    /// first fetch fails.
    async fn get_base_configuration(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Arc<dyn Configuration>, ConfigurationError>;

    /// Ask for a refresh on the next `get_base_configuration`; rate limited
    fn request_refresh(&self);

    /// Whether last-known-good fallback is enabled
    fn use_last_known_good_configuration(&self) -> bool;

    /// Most recent last-known-good configuration, if still within its lifetime
    fn last_known_good_configuration(&self) -> Option<Arc<dyn Configuration>>;

    /// Last-known-good configurations within their lifetime, newest first
    fn last_known_good_configurations(&self) -> Vec<Arc<dyn Configuration>>;

    /// Record `configuration` as the most recent last-known-good configuration
    fn set_last_known_good(&self, configuration: Arc<dyn Configuration>);

    /// Note that a last-known-good configuration rescued a validation
    fn record_last_known_good_recovery(&self) {}
}

/// Whether two configuration handles point at the same instance
pub(crate) fn same_configuration(a: &Arc<dyn Configuration>, b: &Arc<dyn Configuration>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
