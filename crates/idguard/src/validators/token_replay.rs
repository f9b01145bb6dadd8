use chrono::{DateTime, Utc};
use tracing::debug;

use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, TokenReplayFailure, TokenReplayFailureKind, ValidationError,
    ValidationFailureType, ValidationResult,
};
use crate::parameters::ValidationParameters;

/// Default replay check
///
/// Without a replay cache the expiration is returned unchanged. With one,
/// the token must carry an expiration, must not be in the cache, and is
/// recorded until it expires.
///
/// # Errors
///
/// `TokenReplayValidationFailed` with a [`TokenReplayFailureKind`] of
/// `NoExpiration`, `Detected` or `AddFailed`.
pub fn validate_token_replay(
    expiration: Option<DateTime<Utc>>,
    security_token: &str,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<Option<DateTime<Utc>>> {
    if security_token.is_empty() {
        return Err(ValidationError::null_argument("security_token"));
    }

    let Some(cache) = parameters.token_replay_cache.as_ref() else {
        return Ok(expiration);
    };

    let fail = |kind, message: MessageDetail| {
        ValidationError::new(
            message,
            ValidationFailureType::TokenReplayValidationFailed,
            ErrorDetail::TokenReplay(TokenReplayFailure { kind, expiration }),
        )
    };

    let Some(expires_on) = expiration else {
        return Err(fail(
            TokenReplayFailureKind::NoExpiration,
            MessageDetail::new("A token replay cache is configured but the token has no expiration."),
        ));
    };

    if cache.contains(security_token) {
        return Err(fail(
            TokenReplayFailureKind::Detected,
            MessageDetail::new("The token was already presented and has been found in the replay cache."),
        ));
    }

    if !cache.try_add(security_token, expires_on) {
        return Err(fail(
            TokenReplayFailureKind::AddFailed,
            MessageDetail::new("The token could not be added to the replay cache. Expires '{0}'.")
                .arg(expires_on),
        ));
    }

    debug!(activity_id = %call_context.activity_id, "Token recorded in replay cache");
    Ok(expiration)
}
