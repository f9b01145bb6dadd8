use tracing::debug;

use crate::context::CallContext;
use crate::error::{
    AudienceFailure, ErrorDetail, MessageDetail, ValidationError, ValidationFailureType,
    ValidationResult,
};
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default audience check
///
/// Succeeds with the first token audience (in token order) that matches a
/// valid audience. Matching is exact and case-sensitive; with
/// `ignore_trailing_slash_when_validating_audience` two values that differ
/// only by one trailing `/` also match. Empty strings never match.
///
/// # Errors
///
/// - `NoTokenAudiencesProvided` when the token carries no audience
/// - `NoValidationParameterAudiencesProvided` when no valid audience is configured
/// - `AudienceValidationFailed` when nothing matched
pub fn validate_audience(
    token_audiences: &[String],
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<String> {
    let failure = || {
        ErrorDetail::Audience(AudienceFailure {
            token_audiences: token_audiences.to_vec(),
            valid_audiences: parameters.valid_audiences.clone(),
        })
    };

    if token_audiences.is_empty() {
        return Err(ValidationError::new(
            MessageDetail::new("The token has no audiences."),
            ValidationFailureType::NoTokenAudiencesProvided,
            failure(),
        ));
    }

    if parameters.valid_audiences.is_empty() {
        return Err(ValidationError::new(
            MessageDetail::new("No valid audiences were configured to validate the token against."),
            ValidationFailureType::NoValidationParameterAudiencesProvided,
            failure(),
        ));
    }

    let ignore_trailing_slash = parameters.ignore_trailing_slash_when_validating_audience;
    for token_audience in token_audiences.iter().filter(|a| !a.is_empty()) {
        let matched = parameters
            .valid_audiences
            .iter()
            .filter(|v| !v.is_empty())
            .any(|valid| audiences_match(token_audience, valid, ignore_trailing_slash));
        if matched {
            debug!(
                activity_id = %call_context.activity_id,
                "Audience validated"
            );
            return Ok(token_audience.clone());
        }
    }

    Err(ValidationError::new(
        MessageDetail::new("Audience validation failed. Audiences: '{0}'. Did not match: '{1}'.")
            .pii_arg(token_audiences.join(", "))
            .pii_arg(parameters.valid_audiences.join(", ")),
        ValidationFailureType::AudienceValidationFailed,
        failure(),
    ))
}

fn audiences_match(token_audience: &str, valid: &str, ignore_trailing_slash: bool) -> bool {
    if token_audience == valid {
        return true;
    }
    if !ignore_trailing_slash {
        return false;
    }
    let (longer, shorter) = if token_audience.len() > valid.len() {
        (token_audience, valid)
    } else {
        (valid, token_audience)
    };
    longer.len() == shorter.len() + 1 && longer.ends_with('/') && longer.starts_with(shorter)
}
