use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::last_known_good::LastKnownGood;
use super::{
    BaseConfigurationManager, Configuration, ConfigurationError, ConfigurationManagerOptions,
    ConfigurationRetriever, ConfigurationTelemetry, ConfigurationValidator, MetricsTelemetry,
    RefreshStatus,
};
use crate::time::{TimeProvider, system_clock};

/// `last_request_refresh` before the first request
const NEVER: i64 = i64::MIN;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Fetches, caches and refreshes a configuration of type `C`
///
/// Cloning is cheap; clones share the cache, the refresh gate and the
/// last-known-good history.
///
/// ```rust,no_run
/// use idguard::configuration::{
///     ConfigurationManager, OpenIdConnectConfiguration, OpenIdConnectConfigurationRetriever,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConfigurationManager::<OpenIdConnectConfiguration>::new(
///     "https://login.example.com/.well-known/openid-configuration",
///     OpenIdConnectConfigurationRetriever::new(),
/// )?;
/// let configuration = manager.get_configuration(&CancellationToken::new()).await?;
/// println!("issuer: {:?}", configuration.issuer);
/// # Ok(())
/// # }
/// ```
pub struct ConfigurationManager<C: Configuration> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: Configuration> Clone for ConfigurationManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Configuration> fmt::Debug for ConfigurationManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("metadata_address", &self.inner.metadata_address)
            .field("options", &self.inner.options)
            .field("has_configuration", &self.inner.current.read().is_some())
            .finish_non_exhaustive()
    }
}

struct ManagerInner<C: Configuration> {
    metadata_address: String,
    retriever: Arc<dyn ConfigurationRetriever<C>>,
    validator: Option<Arc<dyn ConfigurationValidator<C>>>,
    telemetry: Arc<dyn ConfigurationTelemetry>,
    time_provider: Arc<dyn TimeProvider>,
    options: ConfigurationManagerOptions,
    current: RwLock<Option<Arc<C>>>,
    /// Millis since the epoch after which `current` is stale
    sync_after: AtomicI64,
    last_request_refresh: AtomicI64,
    refresh_requested: AtomicBool,
    refresh_state: AtomicU8,
    first_fetch_gate: tokio::sync::Mutex<()>,
    last_known_good: Mutex<LastKnownGood<dyn Configuration>>,
}

/// Holds the refresh gate; releases it on drop, including when the refresh
/// future is dropped mid-flight
struct RefreshGuard<C: Configuration> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: Configuration> Drop for RefreshGuard<C> {
    fn drop(&mut self) {
        self.inner.refresh_state.store(IDLE, Ordering::Release);
    }
}

/// Builder for [`ConfigurationManager`]
pub struct ConfigurationManagerBuilder<C: Configuration> {
    metadata_address: String,
    retriever: Arc<dyn ConfigurationRetriever<C>>,
    validator: Option<Arc<dyn ConfigurationValidator<C>>>,
    telemetry: Arc<dyn ConfigurationTelemetry>,
    time_provider: Arc<dyn TimeProvider>,
    options: ConfigurationManagerOptions,
}

impl<C: Configuration> ConfigurationManagerBuilder<C> {
    /// Replace the default options
    pub fn options(mut self, options: ConfigurationManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Check every retrieved configuration before publishing it
    pub fn validator(mut self, validator: impl ConfigurationValidator<C> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Replace the default [`MetricsTelemetry`] sink
    pub fn telemetry(mut self, telemetry: Arc<dyn ConfigurationTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replace the wall clock
    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Build the manager
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidAddress`] for an empty metadata
    /// address and [`ConfigurationError::InvalidOptions`] for options below
    /// their minimums.
    pub fn build(self) -> Result<ConfigurationManager<C>, ConfigurationError> {
        if self.metadata_address.trim().is_empty() {
            return Err(ConfigurationError::InvalidAddress(
                "metadata address must not be empty".to_string(),
            ));
        }
        self.options.validate()?;

        let lifetime = chrono::Duration::from_std(self.options.last_known_good_lifetime)
            .unwrap_or(chrono::Duration::MAX);
        let last_known_good =
            LastKnownGood::new(self.options.last_known_good_size_limit, lifetime);

        Ok(ConfigurationManager {
            inner: Arc::new(ManagerInner {
                metadata_address: self.metadata_address,
                retriever: self.retriever,
                validator: self.validator,
                telemetry: self.telemetry,
                time_provider: self.time_provider,
                options: self.options,
                current: RwLock::new(None),
                sync_after: AtomicI64::new(0),
                last_request_refresh: AtomicI64::new(NEVER),
                refresh_requested: AtomicBool::new(false),
                refresh_state: AtomicU8::new(IDLE),
                first_fetch_gate: tokio::sync::Mutex::new(()),
                last_known_good: Mutex::new(last_known_good),
            }),
        })
    }
}

impl<C: Configuration> ConfigurationManager<C> {
    /// Manager with default options
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidAddress`] for an empty metadata address.
    pub fn new(
        metadata_address: impl Into<String>,
        retriever: impl ConfigurationRetriever<C> + 'static,
    ) -> Result<Self, ConfigurationError> {
        Self::builder(metadata_address, retriever).build()
    }

    /// Start building a manager
    pub fn builder(
        metadata_address: impl Into<String>,
        retriever: impl ConfigurationRetriever<C> + 'static,
    ) -> ConfigurationManagerBuilder<C> {
        ConfigurationManagerBuilder {
            metadata_address: metadata_address.into(),
            retriever: Arc::new(retriever),
            validator: None,
            telemetry: Arc::new(MetricsTelemetry),
            time_provider: system_clock(),
            options: ConfigurationManagerOptions::default(),
        }
    }

    /// Options the manager runs with
    pub fn options(&self) -> &ConfigurationManagerOptions {
        &self.inner.options
    }

    /// Current configuration
    ///
    /// Fresh configurations are served from cache. The first call fetches
    /// while concurrent callers wait for that fetch; `cancellation` abandons
    /// only the wait. A stale configuration is refreshed inline after
    /// [`request_refresh`](Self::request_refresh), otherwise on a background
    /// task while the stale value is returned.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::RetrievalFailed`] when no configuration was ever
    /// obtained and the fetch fails; [`ConfigurationError::Cancelled`] when
    /// `cancellation` fires while waiting for the first fetch.
    pub async fn get_configuration(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Arc<C>, ConfigurationError> {
        let inner = &self.inner;
        let cached = inner.current.read().clone();
        let Some(current) = cached else {
            return inner.first_fetch(cancellation).await;
        };

        if inner.now_millis() < inner.sync_after.load(Ordering::Acquire) {
            return Ok(current);
        }

        let Some(guard) = inner.try_begin_refresh() else {
            debug!(
                metadata_address = %inner.metadata_address,
                "Refresh already running, serving cached configuration"
            );
            return Ok(current);
        };

        if inner.refresh_requested.swap(false, Ordering::AcqRel) {
            inner.refresh(RefreshStatus::Automatic).await;
            drop(guard);
            let refreshed = inner.current.read().clone();
            return Ok(refreshed.unwrap_or(current));
        }

        let background = Arc::clone(inner);
        tokio::spawn(async move {
            let _guard = guard;
            background.refresh(RefreshStatus::Automatic).await;
        });
        Ok(current)
    }

    /// Publish `configuration` as current and schedule the next automatic refresh
    pub fn update_configuration(&self, configuration: C) {
        self.inner.update(Arc::new(configuration));
    }

    /// Ask for a refresh on the next [`get_configuration`](Self::get_configuration)
    ///
    /// Honoured on the first call and then at most once per
    /// `refresh_interval`; other calls are ignored.
    pub fn request_refresh(&self) {
        let inner = &self.inner;
        let now = inner.now_millis();
        let last = inner.last_request_refresh.load(Ordering::Acquire);
        let interval = millis(inner.options.refresh_interval);

        if last != NEVER && now.saturating_sub(last) < interval {
            debug!(
                metadata_address = %inner.metadata_address,
                "Refresh request ignored, refresh interval has not elapsed"
            );
            return;
        }
        if inner
            .last_request_refresh
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        inner.sync_after.store(now, Ordering::Release);
        inner.refresh_requested.store(true, Ordering::Release);
        inner.telemetry.increment_configuration_refresh_request_counter(
            &inner.metadata_address,
            RefreshStatus::Manual,
            None,
        );
        info!(metadata_address = %inner.metadata_address, "Configuration refresh requested");
    }
}

impl<C: Configuration> ManagerInner<C> {
    fn now_millis(&self) -> i64 {
        self.time_provider.now().timestamp_millis()
    }

    fn try_begin_refresh(self: &Arc<Self>) -> Option<RefreshGuard<C>> {
        self.refresh_state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                inner: Arc::clone(self),
            })
    }

    async fn first_fetch(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Arc<C>, ConfigurationError> {
        let _gate = tokio::select! {
            gate = self.first_fetch_gate.lock() => gate,
            () = cancellation.cancelled() => return Err(ConfigurationError::Cancelled),
        };

        // Another caller may have completed the fetch while we waited
        let cached = self.current.read().clone();
        if let Some(current) = cached {
            return Ok(current);
        }

        match self.retrieve(RefreshStatus::FirstRefresh).await {
            Ok(configuration) => {
                self.update(Arc::clone(&configuration));
                info!(metadata_address = %self.metadata_address, "Configuration retrieved");
                Ok(configuration)
            }
            Err(error) => {
                warn!(
                    metadata_address = %self.metadata_address,
                    error = %error,
                    "Unable to obtain configuration"
                );
                Err(ConfigurationError::RetrievalFailed {
                    address: self.metadata_address.clone(),
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Refresh `current`; failures keep the previous configuration
    async fn refresh(&self, status: RefreshStatus) {
        match self.retrieve(status).await {
            Ok(configuration) => {
                self.update(configuration);
                info!(metadata_address = %self.metadata_address, "Configuration refreshed");
            }
            Err(error) => {
                let retry_in = self
                    .options
                    .refresh_interval
                    .min(self.options.automatic_refresh_interval);
                self.sync_after.store(
                    self.now_millis().saturating_add(millis(retry_in)),
                    Ordering::Release,
                );
                warn!(
                    metadata_address = %self.metadata_address,
                    error = %error,
                    retry_in_secs = retry_in.as_secs(),
                    "Configuration refresh failed, keeping previous configuration"
                );
            }
        }
    }

    /// Fetch with a private cancellation token, validate, record telemetry
    async fn retrieve(&self, status: RefreshStatus) -> Result<Arc<C>, ConfigurationError> {
        let started = Instant::now();
        let result = self
            .retriever
            .get_configuration(&self.metadata_address, &CancellationToken::new())
            .await
            .and_then(|configuration| {
                if let Some(validator) = &self.validator {
                    validator.validate(&configuration)?;
                }
                Ok(configuration)
            });

        let error = result.as_ref().err();
        self.telemetry.log_configuration_retrieval_duration(
            &self.metadata_address,
            started.elapsed(),
            error,
        );
        self.telemetry.increment_configuration_refresh_request_counter(
            &self.metadata_address,
            status,
            error,
        );
        result.map(Arc::new)
    }

    fn update(&self, configuration: Arc<C>) {
        *self.current.write() = Some(configuration);

        let interval = millis(self.options.automatic_refresh_interval);
        let jitter = i64::try_from(fastrand::u64(0..=interval.unsigned_abs() / 20)).unwrap_or(0);
        self.sync_after.store(
            self.now_millis().saturating_add(interval).saturating_add(jitter),
            Ordering::Release,
        );
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl<C: Configuration> BaseConfigurationManager for ConfigurationManager<C> {
    fn metadata_address(&self) -> &str {
        &self.inner.metadata_address
    }

    async fn get_base_configuration(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Arc<dyn Configuration>, ConfigurationError> {
        let configuration: Arc<dyn Configuration> = self.get_configuration(cancellation).await?;
        Ok(configuration)
    }

    fn request_refresh(&self) {
        ConfigurationManager::request_refresh(self);
    }

    fn use_last_known_good_configuration(&self) -> bool {
        self.inner.options.use_last_known_good_configuration
    }

    fn last_known_good_configuration(&self) -> Option<Arc<dyn Configuration>> {
        let now = self.inner.time_provider.now();
        self.inner.last_known_good.lock().head(now)
    }

    fn last_known_good_configurations(&self) -> Vec<Arc<dyn Configuration>> {
        let now = self.inner.time_provider.now();
        self.inner.last_known_good.lock().configurations(now)
    }

    fn set_last_known_good(&self, configuration: Arc<dyn Configuration>) {
        let any: &dyn Any = configuration.as_ref();
        if !any.is::<C>() {
            warn!(
                metadata_address = %self.inner.metadata_address,
                "Ignoring last known good configuration of a foreign type"
            );
            return;
        }
        let now = self.inner.time_provider.now();
        self.inner.last_known_good.lock().set(configuration, now);
    }

    fn record_last_known_good_recovery(&self) {
        self.inner.telemetry.increment_configuration_refresh_request_counter(
            &self.inner.metadata_address,
            RefreshStatus::LastKnownGood,
            None,
        );
    }
}
