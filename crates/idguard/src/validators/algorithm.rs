use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
};
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default algorithm check: an empty allow-list accepts any algorithm
///
/// # Errors
///
/// `AlgorithmValidationFailed` when `algorithm` is not in `valid_algorithms`.
pub fn validate_algorithm(
    algorithm: &str,
    _key: &SigningKey,
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    _call_context: &CallContext,
) -> ValidationResult<String> {
    if parameters.valid_algorithms.is_empty()
        || parameters.valid_algorithms.iter().any(|valid| valid == algorithm)
    {
        return Ok(algorithm.to_string());
    }

    Err(ValidationError::new(
        MessageDetail::new("The algorithm '{0}' is not in the list of valid algorithms '{1}'.")
            .arg(algorithm)
            .arg(parameters.valid_algorithms.join(", ")),
        ValidationFailureType::AlgorithmValidationFailed,
        ErrorDetail::Algorithm {
            invalid_algorithm: Some(algorithm.to_string()),
        },
    ))
}
