use jsonwebtoken::Algorithm;
use tracing::debug;

use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::ValidationResult;
use crate::jwt::JsonWebToken;
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;
use crate::validators::signature::{unsigned, verify_with_signing_keys};

/// Default signature check of a JWS
///
/// Candidate keys come from the resolver override when set. Otherwise keys
/// whose id equals the token's `kid` are taken from the configuration, then
/// from the parameters; a token without a `kid`, or one whose `kid` matches
/// nothing while `try_all_issuer_signing_keys` is set, is tried against every
/// key. Each candidate must pass the algorithm check before it is used.
///
/// # Errors
///
/// - `KeyNotFound` when there is no candidate key
/// - `Invalid` when no candidate verified the signature, with the algorithm
///   failure nested when a candidate was rejected by the algorithm check
/// - `Invalid` for unsigned tokens
pub fn validate_signature(
    jwt: &JsonWebToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
) -> ValidationResult<SigningKey> {
    let algorithm = jwt.algorithm().unwrap_or_default();
    let (Some(signing_input), Some(signature)) = (jwt.signing_input(), jwt.signature()) else {
        return Err(unsigned());
    };
    if signature.is_empty() || algorithm.is_empty() || algorithm.eq_ignore_ascii_case("none") {
        return Err(unsigned());
    }

    verify_with_signing_keys(
        jwt,
        algorithm,
        parameters,
        configuration,
        call_context,
        |key| verify(&signing_input, signature, algorithm, key),
    )
}

fn verify(signing_input: &str, signature: &str, algorithm: &str, key: &SigningKey) -> bool {
    let Ok(algorithm) = algorithm.parse::<Algorithm>() else {
        debug!(algorithm, "Unsupported signature algorithm");
        return false;
    };
    let decoding_key = match key.decoding_key() {
        Ok(decoding_key) => decoding_key,
        Err(error) => {
            debug!(kid = ?key.key_id(), error = %error, "Signing key unusable");
            return false;
        }
    };
    jsonwebtoken::crypto::verify(signature, signing_input.as_bytes(), &decoding_key, algorithm)
        .unwrap_or(false)
}
