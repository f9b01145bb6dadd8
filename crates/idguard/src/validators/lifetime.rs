use chrono::{DateTime, Utc};

use super::ValidatedLifetime;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, LifetimeFailure, LifetimeFailureKind, MessageDetail, ValidationError,
    ValidationFailureType, ValidationResult,
};
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default lifetime check
///
/// The clock skew widens the window on both ends. `not_before > expires` is
/// reported before any comparison with the current time.
///
/// # Errors
///
/// `LifetimeValidationFailed` with a [`LifetimeFailureKind`] of
/// `NoExpiration`, `InvalidLifetime`, `NotYetValid` or `Expired`.
pub fn validate_lifetime(
    not_before: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    _call_context: &CallContext,
) -> ValidationResult<ValidatedLifetime> {
    let fail = |kind, message: MessageDetail| {
        ValidationError::new(
            message,
            ValidationFailureType::LifetimeValidationFailed,
            ErrorDetail::Lifetime(LifetimeFailure {
                kind,
                not_before,
                expires,
            }),
        )
    };

    let Some(expires_at) = expires else {
        return Err(fail(
            LifetimeFailureKind::NoExpiration,
            MessageDetail::new("The token has no expiration time."),
        ));
    };

    if let Some(not_before_at) = not_before
        && not_before_at > expires_at
    {
        return Err(fail(
            LifetimeFailureKind::InvalidLifetime,
            MessageDetail::new("The token's NotBefore '{0}' is after its Expires '{1}'.")
                .arg(not_before_at)
                .arg(expires_at),
        ));
    }

    let now = parameters.time_provider.now();
    let skew = parameters.clock_skew;

    if let Some(not_before_at) = not_before
        && now
            .checked_add_signed(skew)
            .is_some_and(|latest| not_before_at > latest)
    {
        return Err(fail(
            LifetimeFailureKind::NotYetValid,
            MessageDetail::new("The token is not yet valid. NotBefore '{0}', current time '{1}'.")
                .arg(not_before_at)
                .arg(now),
        ));
    }

    if now
        .checked_sub_signed(skew)
        .is_some_and(|earliest| expires_at < earliest)
    {
        return Err(fail(
            LifetimeFailureKind::Expired,
            MessageDetail::new("The token is expired. Expires '{0}', current time '{1}'.")
                .arg(expires_at)
                .arg(now),
        ));
    }

    Ok(ValidatedLifetime {
        not_before,
        expires,
    })
}
