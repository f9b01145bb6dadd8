//! Configuration refresh and last-known-good recovery
//!
//! Some failures mean the token may be fine but the configuration is out of
//! date: the issuer rolled its signing keys or changed its issuer name. For
//! those the checks are re-run against a freshly retrieved configuration
//! and then against recent last-known-good configurations.
//!
//! | failure                  | recoverable | a candidate configuration is tried when             |
//! |--------------------------|-------------|-----------------------------------------------------|
//! | `InvalidIssuer`          | yes         | its issuer differs from the failing configuration's |
//! | `InvalidSignature`       | yes         | see below                                           |
//! | `SignatureKeyNotFound`   | yes         | see below                                           |
//! | anything else            | no          |                                                     |
//!
//! For signature failures of a token with a `kid`, a candidate is tried
//! when it has a key with that id and the failing configuration either lacks
//! that id or holds different material under it. Without a `kid`, a
//! candidate is tried when its key set differs.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::configuration::{BaseConfigurationManager, Configuration, same_configuration};
use crate::context::CallContext;
use crate::error::{ExceptionType, ValidationResult};
use crate::keys::same_key_set;
use crate::parameters::ValidationParameters;
use crate::validated::ValidatedToken;

/// Whether a failure of this type may go away with another configuration
pub(crate) fn is_recoverable(exception_type: &ExceptionType) -> bool {
    matches!(
        exception_type,
        ExceptionType::InvalidIssuer
            | ExceptionType::InvalidSignature
            | ExceptionType::SignatureKeyNotFound
    )
}

/// Whether re-running the checks against `candidate` could fix a failure
/// that happened against `failed`
pub(crate) fn configuration_may_recover(
    exception_type: &ExceptionType,
    key_id: Option<&str>,
    candidate: &dyn Configuration,
    failed: &dyn Configuration,
) -> bool {
    match exception_type {
        ExceptionType::InvalidIssuer => candidate.issuer() != failed.issuer(),
        ExceptionType::InvalidSignature | ExceptionType::SignatureKeyNotFound => match key_id {
            Some(kid) => {
                let Some(candidate_key) = candidate
                    .signing_keys()
                    .iter()
                    .find(|key| key.key_id() == Some(kid))
                else {
                    return false;
                };
                match failed.signing_keys().iter().find(|key| key.key_id() == Some(kid)) {
                    None => true,
                    Some(failed_key) => !candidate_key.same_material(failed_key),
                }
            }
            None => !same_key_set(candidate.signing_keys(), failed.signing_keys()),
        },
        _ => false,
    }
}

/// Run `run_checks` against the manager's configuration, refreshing it and
/// falling back to last-known-good configurations on recoverable failures
///
/// `run_checks` receives the configuration to validate against (`None` when
/// there is no manager or it has nothing to offer). On success the
/// configuration used is recorded on the [`ValidatedToken`] and promoted to
/// the head of the manager's last-known-good history.
pub(crate) async fn validate_with_recovery<F, Fut>(
    parameters: &ValidationParameters,
    key_id: Option<&str>,
    call_context: &CallContext,
    cancellation: &CancellationToken,
    mut run_checks: F,
) -> ValidationResult<ValidatedToken>
where
    F: FnMut(Option<Arc<dyn Configuration>>) -> Fut,
    Fut: Future<Output = ValidationResult<ValidatedToken>>,
{
    let Some(manager) = parameters.configuration_manager.as_deref() else {
        return run_checks(None).await;
    };

    if parameters.refresh_before_validation {
        manager.request_refresh();
    }
    let Some(mut current) = current_configuration(manager, call_context, cancellation).await
    else {
        return run_checks(None).await;
    };

    let mut error = match run_checks(Some(Arc::clone(&current))).await {
        Ok(validated) => return Ok(accept(manager, validated, current, false)),
        Err(error) => error,
    };
    let exception_type = error.exception_type();
    if !is_recoverable(&exception_type) {
        return Err(error);
    }

    let mut tried = vec![Arc::clone(&current)];

    debug!(
        activity_id = %call_context.activity_id,
        failure = %exception_type,
        "Recoverable failure, refreshing configuration"
    );
    manager.request_refresh();
    if let Some(refreshed) = current_configuration(manager, call_context, cancellation).await
        && !same_configuration(&refreshed, &current)
    {
        match run_checks(Some(Arc::clone(&refreshed))).await {
            Ok(validated) => return Ok(accept(manager, validated, refreshed, true)),
            Err(retry_error) => {
                error = retry_error;
                tried.push(Arc::clone(&refreshed));
                current = refreshed;
            }
        }
    }

    let exception_type = error.exception_type();
    if !manager.use_last_known_good_configuration() || !is_recoverable(&exception_type) {
        return Err(error);
    }

    for candidate in manager.last_known_good_configurations() {
        if tried.iter().any(|seen| same_configuration(seen, &candidate)) {
            continue;
        }
        if !configuration_may_recover(&exception_type, key_id, candidate.as_ref(), current.as_ref())
        {
            continue;
        }
        tried.push(Arc::clone(&candidate));

        if let Ok(validated) = run_checks(Some(Arc::clone(&candidate))).await {
            info!(
                activity_id = %call_context.activity_id,
                metadata_address = %manager.metadata_address(),
                "Token validated with a last known good configuration"
            );
            manager.record_last_known_good_recovery();
            return Ok(accept(manager, validated, candidate, true));
        }
    }

    Err(error)
}

async fn current_configuration(
    manager: &dyn BaseConfigurationManager,
    call_context: &CallContext,
    cancellation: &CancellationToken,
) -> Option<Arc<dyn Configuration>> {
    match manager.get_base_configuration(cancellation).await {
        Ok(configuration) => Some(configuration),
        Err(error) => {
            warn!(
                activity_id = %call_context.activity_id,
                metadata_address = %manager.metadata_address(),
                error = %error,
                "Unable to obtain configuration, validating without one"
            );
            None
        }
    }
}

fn accept(
    manager: &dyn BaseConfigurationManager,
    mut validated: ValidatedToken,
    configuration: Arc<dyn Configuration>,
    refreshed: bool,
) -> ValidatedToken {
    manager.set_last_known_good(Arc::clone(&configuration));
    validated.configuration = Some(configuration);
    validated.configuration_refreshed = refreshed;
    validated
}
