use tracing::debug;

use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, SignatureFailure, SignatureFailureKind, ValidationError,
    ValidationFailureType, ValidationResult,
};
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

use super::guard::guard;
use super::run_algorithm;

pub(crate) fn signature_detail(
    kind: SignatureFailureKind,
    inner_validation_error: Option<Box<ValidationError>>,
) -> ErrorDetail {
    ErrorDetail::Signature(SignatureFailure {
        kind,
        inner_validation_error,
    })
}

#[track_caller]
pub(crate) fn unsigned() -> ValidationError {
    ValidationError::new(
        MessageDetail::new("The token is not signed. Unsigned tokens are not accepted."),
        ValidationFailureType::SignatureValidationFailed,
        signature_detail(SignatureFailureKind::Invalid, None),
    )
}

/// Keys a signature may have been made with
///
/// The resolver override wins when set. Otherwise keys whose id equals the
/// token's key id are taken from the configuration, then from the parameters.
/// A token without a key id, or one whose id matches nothing while
/// `try_all_issuer_signing_keys` is set, gets every known key.
pub(crate) fn resolve_signing_keys(
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
) -> ValidationResult<Vec<SigningKey>> {
    if let Some(resolver) = &parameters.validators.issuer_signing_key_resolver {
        return guard(
            "issuer signing key resolver",
            ValidationFailureType::SignatureValidatorThrew,
            || signature_detail(SignatureFailureKind::KeyNotFound, None),
            || {
                Ok(resolver(
                    token.raw(),
                    token,
                    token.key_id(),
                    parameters,
                    configuration,
                    call_context,
                ))
            },
        );
    }

    let known = configuration
        .map(|c| c.signing_keys())
        .unwrap_or_default()
        .iter()
        .chain(&parameters.issuer_signing_keys);

    let Some(kid) = token.key_id() else {
        return Ok(known.cloned().collect());
    };
    let matched: Vec<SigningKey> = known
        .clone()
        .filter(|key| key.key_id() == Some(kid))
        .cloned()
        .collect();
    if matched.is_empty() && parameters.try_all_issuer_signing_keys {
        debug!(kid, "No key matched kid, trying all signing keys");
        return Ok(known.cloned().collect());
    }
    Ok(matched)
}

/// Try `verify` with each resolved key that passes the algorithm check
///
/// # Errors
///
/// - `KeyNotFound` when no key was resolved
/// - `Invalid` when no key verified; the last algorithm failure is nested,
///   and the failure type is `SignatureAlgorithmValidationFailed` when every
///   key was rejected by the algorithm check
pub(crate) fn verify_with_signing_keys(
    token: &dyn SecurityToken,
    algorithm: &str,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
    mut verify: impl FnMut(&SigningKey) -> bool,
) -> ValidationResult<SigningKey> {
    let candidates = resolve_signing_keys(token, parameters, configuration, call_context)?;
    let kid = token.key_id().unwrap_or("<none>");
    if candidates.is_empty() {
        return Err(ValidationError::new(
            MessageDetail::new("Signature validation failed. No signing key matched kid '{0}'.")
                .arg(kid),
            ValidationFailureType::SignatureValidationFailed,
            signature_detail(SignatureFailureKind::KeyNotFound, None),
        ));
    }

    let mut algorithm_error = None;
    let mut keys_tried = 0usize;
    for key in &candidates {
        if let Err(error) = run_algorithm(algorithm, key, token, parameters, call_context) {
            algorithm_error = Some(error);
            continue;
        }
        keys_tried += 1;
        if verify(key) {
            debug!(
                activity_id = %call_context.activity_id,
                kid = ?key.key_id(),
                algorithm,
                "Signature verified"
            );
            return Ok(key.clone());
        }
    }

    let failure_type = if keys_tried == 0 {
        ValidationFailureType::SignatureAlgorithmValidationFailed
    } else {
        ValidationFailureType::SignatureValidationFailed
    };
    Err(ValidationError::new(
        MessageDetail::new("Signature validation failed. Keys tried: '{0}'. kid: '{1}'.")
            .arg(keys_tried)
            .arg(kid),
        failure_type,
        signature_detail(SignatureFailureKind::Invalid, algorithm_error.map(Box::new)),
    ))
}
