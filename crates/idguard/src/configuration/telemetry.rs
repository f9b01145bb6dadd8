use std::fmt::{self, Debug};
use std::time::Duration;

use super::ConfigurationError;
use crate::metrics;

/// Why a configuration retrieval or refresh happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshStatus {
    /// The cached configuration went stale
    Automatic,
    /// A refresh was requested
    Manual,
    /// No configuration had been fetched yet
    FirstRefresh,
    /// A last-known-good configuration validated a token
    LastKnownGood,
}

impl RefreshStatus {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Automatic => "automatic",
            RefreshStatus::Manual => "manual",
            RefreshStatus::FirstRefresh => "first_refresh",
            RefreshStatus::LastKnownGood => "last_known_good",
        }
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for configuration manager telemetry
pub trait ConfigurationTelemetry: Send + Sync + Debug {
    /// Count a refresh request or attempt
    fn increment_configuration_refresh_request_counter(
        &self,
        metadata_address: &str,
        status: RefreshStatus,
        error: Option<&ConfigurationError>,
    );

    /// Record how long a retrieval took
    fn log_configuration_retrieval_duration(
        &self,
        metadata_address: &str,
        duration: Duration,
        error: Option<&ConfigurationError>,
    );
}

/// Telemetry through the `metrics` facade; a no-op without the `metrics` feature
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

impl ConfigurationTelemetry for MetricsTelemetry {
    fn increment_configuration_refresh_request_counter(
        &self,
        metadata_address: &str,
        status: RefreshStatus,
        error: Option<&ConfigurationError>,
    ) {
        metrics::record_configuration_refresh_request(
            metadata_address,
            status.as_str(),
            error.map(ConfigurationError::kind).unwrap_or_default(),
        );
    }

    fn log_configuration_retrieval_duration(
        &self,
        metadata_address: &str,
        duration: Duration,
        error: Option<&ConfigurationError>,
    ) {
        metrics::record_configuration_retrieval_duration(
            metadata_address,
            duration.as_secs_f64(),
            error.map(ConfigurationError::kind).unwrap_or_default(),
        );
    }
}
