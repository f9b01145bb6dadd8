//! Validation and configuration metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `idguard_configuration_refresh_requests_total` - Counter for configuration refreshes (labels: version, address, status, exception)
//! - `idguard_configuration_retrieval_duration_seconds` - Histogram for configuration retrieval duration (labels: version, address, exception)
//! - `idguard_token_validations_total` - Counter for token validations (labels: token_type, status)
//!
//! ## Example
//!
//! ```rust
//! use idguard::init_validation_metrics;
//!
//! // Initialize metric descriptions once at startup
//! init_validation_metrics();
//! ```

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Library version reported in every configuration metric
#[cfg(feature = "metrics")]
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize metric descriptions. Call once at startup.
///
/// Idempotent; only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_validation_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "idguard_configuration_refresh_requests_total",
            "Configuration refresh requests (automatic, manual, first fetch, last known good)"
        );
        describe_histogram!(
            "idguard_configuration_retrieval_duration_seconds",
            "Configuration retrieval duration in seconds"
        );
        describe_counter!(
            "idguard_token_validations_total",
            "Token validations (success and failure)"
        );
    });
}

/// Record a configuration refresh request
///
/// # Arguments
///
/// * `address` - Metadata address of the configuration
/// * `status` - `automatic`, `manual`, `first_refresh` or `last_known_good`
/// * `exception` - Failure label, empty on success
#[cfg(feature = "metrics")]
pub(crate) fn record_configuration_refresh_request(address: &str, status: &str, exception: &str) {
    counter!(
        "idguard_configuration_refresh_requests_total",
        "version" => VERSION,
        "address" => address.to_owned(),
        "status" => status.to_owned(),
        "exception" => exception.to_owned()
    )
    .increment(1);
}

/// Record how long a configuration retrieval took
#[cfg(feature = "metrics")]
pub(crate) fn record_configuration_retrieval_duration(
    address: &str,
    duration_seconds: f64,
    exception: &str,
) {
    histogram!(
        "idguard_configuration_retrieval_duration_seconds",
        "version" => VERSION,
        "address" => address.to_owned(),
        "exception" => exception.to_owned()
    )
    .record(duration_seconds);
}

/// Record a token validation outcome
#[cfg(feature = "metrics")]
pub(crate) fn record_token_validation(token_type: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "idguard_token_validations_total",
        "token_type" => token_type.to_owned(),
        "status" => status
    )
    .increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_validation_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_configuration_refresh_request(_address: &str, _status: &str, _exception: &str) {
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_configuration_retrieval_duration(
    _address: &str,
    _duration_seconds: f64,
    _exception: &str,
) {
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_token_validation(_token_type: &str, _success: bool) {}
