use super::ValidatedSigningKeyLifetime;
use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, SigningKeyFailure, SigningKeyFailureKind, ValidationError,
    ValidationFailureType, ValidationResult,
};
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default signing key check: the key's validity window, widened by the clock skew
///
/// # Errors
///
/// `IssuerSigningKeyValidationFailed` with a [`SigningKeyFailureKind`] of
/// `NotYetValid` or `Expired`.
pub fn validate_issuer_signing_key(
    key: &SigningKey,
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    _configuration: Option<&dyn Configuration>,
    _call_context: &CallContext,
) -> ValidationResult<ValidatedSigningKeyLifetime> {
    let now = parameters.time_provider.now();
    let skew = parameters.clock_skew;

    let fail = |kind, message: MessageDetail| {
        ValidationError::new(
            message,
            ValidationFailureType::IssuerSigningKeyValidationFailed,
            ErrorDetail::IssuerSigningKey(SigningKeyFailure {
                kind,
                key_id: key.key_id().map(str::to_string),
                not_before: key.not_before(),
                not_after: key.not_after(),
            }),
        )
    };

    if let Some(not_before) = key.not_before()
        && now
            .checked_add_signed(skew)
            .is_some_and(|latest| not_before > latest)
    {
        return Err(fail(
            SigningKeyFailureKind::NotYetValid,
            MessageDetail::new("The signing key '{0}' is not valid before '{1}'. Current time '{2}'.")
                .arg(key.key_id().unwrap_or_default())
                .arg(not_before)
                .arg(now),
        ));
    }

    if let Some(not_after) = key.not_after()
        && now
            .checked_sub_signed(skew)
            .is_some_and(|earliest| not_after < earliest)
    {
        return Err(fail(
            SigningKeyFailureKind::Expired,
            MessageDetail::new("The signing key '{0}' expired at '{1}'. Current time '{2}'.")
                .arg(key.key_id().unwrap_or_default())
                .arg(not_after)
                .arg(now),
        ));
    }

    Ok(ValidatedSigningKeyLifetime {
        valid_from: key.not_before(),
        valid_to: key.not_after(),
        validation_time: now,
    })
}
