use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigurationError;

/// Default interval between automatic refreshes (12 hours)
pub const DEFAULT_AUTOMATIC_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default minimum interval between requested refreshes (5 minutes)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Smallest accepted automatic refresh interval (5 minutes)
pub const MINIMUM_AUTOMATIC_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Smallest accepted refresh interval (1 second)
pub const MINIMUM_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Default last-known-good lifetime (1 hour)
pub const DEFAULT_LAST_KNOWN_GOOD_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Default number of retained last-known-good configurations
pub const DEFAULT_LAST_KNOWN_GOOD_SIZE_LIMIT: usize = 10;

/// Configuration manager tuning
///
/// Durations serialize as `{ "secs": .., "nanos": .. }`; missing fields take defaults.
///
/// ```rust
/// use idguard::configuration::ConfigurationManagerOptions;
///
/// let options: ConfigurationManagerOptions =
///     serde_json::from_str(r#"{ "last_known_good_size_limit": 3 }"#).unwrap();
/// assert_eq!(options.last_known_good_size_limit, 3);
/// assert!(options.use_last_known_good_configuration);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationManagerOptions {
    /// How long a fetched configuration is fresh
    pub automatic_refresh_interval: Duration,
    /// Minimum spacing of honoured refresh requests
    pub refresh_interval: Duration,
    /// How long a configuration stays eligible as last-known-good
    pub last_known_good_lifetime: Duration,
    /// Number of retained last-known-good configurations
    pub last_known_good_size_limit: usize,
    /// Whether the orchestrators may fall back to last-known-good configurations
    pub use_last_known_good_configuration: bool,
}

impl Default for ConfigurationManagerOptions {
    fn default() -> Self {
        Self {
            automatic_refresh_interval: DEFAULT_AUTOMATIC_REFRESH_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            last_known_good_lifetime: DEFAULT_LAST_KNOWN_GOOD_LIFETIME,
            last_known_good_size_limit: DEFAULT_LAST_KNOWN_GOOD_SIZE_LIMIT,
            use_last_known_good_configuration: true,
        }
    }
}

impl ConfigurationManagerOptions {
    /// Check the minimums
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidOptions`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.automatic_refresh_interval < MINIMUM_AUTOMATIC_REFRESH_INTERVAL {
            return Err(ConfigurationError::InvalidOptions(format!(
                "automatic_refresh_interval must be at least {}s",
                MINIMUM_AUTOMATIC_REFRESH_INTERVAL.as_secs()
            )));
        }
        if self.refresh_interval < MINIMUM_REFRESH_INTERVAL {
            return Err(ConfigurationError::InvalidOptions(format!(
                "refresh_interval must be at least {}s",
                MINIMUM_REFRESH_INTERVAL.as_secs()
            )));
        }
        if self.last_known_good_size_limit == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "last_known_good_size_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
