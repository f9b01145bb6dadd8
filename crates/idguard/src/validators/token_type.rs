use super::ValidatedTokenType;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
};
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default token type check
///
/// An empty `valid_types` list accepts any type, including none.
///
/// # Errors
///
/// `TokenTypeValidationFailed` when the type is missing or not listed.
pub fn validate_token_type(
    token_type: Option<&str>,
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    _call_context: &CallContext,
) -> ValidationResult<ValidatedTokenType> {
    if parameters.valid_types.is_empty() {
        return Ok(ValidatedTokenType {
            token_type: token_type.map(str::to_string),
            valid_types_count: 0,
        });
    }

    let Some(token_type) = token_type.filter(|t| !t.is_empty()) else {
        return Err(ValidationError::new(
            MessageDetail::new("The token has no type but valid types are configured."),
            ValidationFailureType::TokenTypeValidationFailed,
            ErrorDetail::TokenType { invalid_type: None },
        ));
    };

    if !parameters.valid_types.iter().any(|valid| valid == token_type) {
        return Err(ValidationError::new(
            MessageDetail::new("The token type '{0}' is not in the list of valid types '{1}'.")
                .arg(token_type)
                .arg(parameters.valid_types.join(", ")),
            ValidationFailureType::TokenTypeValidationFailed,
            ErrorDetail::TokenType {
                invalid_type: Some(token_type.to_string()),
            },
        ));
    }

    Ok(ValidatedTokenType {
        token_type: Some(token_type.to_string()),
        valid_types_count: parameters.valid_types.len(),
    })
}
