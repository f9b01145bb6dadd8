use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{IssuerValidationSource, IssuerValidator, ValidatedIssuer};
use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
};
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Default issuer check
///
/// The configuration's issuer is tried first, then `valid_issuers` in order.
///
/// # Errors
///
/// - `OperationCancelled` when `cancellation` has fired
/// - `IssuerValidationFailed` when the issuer is empty, when there is nothing
///   to compare against, or when nothing matched
pub async fn validate_issuer(
    issuer: &str,
    _token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
    cancellation: &CancellationToken,
) -> ValidationResult<ValidatedIssuer> {
    if cancellation.is_cancelled() {
        return Err(ValidationError::new(
            MessageDetail::new("Issuer validation was cancelled."),
            ValidationFailureType::OperationCancelled,
            ErrorDetail::Generic,
        ));
    }

    let rejected = || ErrorDetail::Issuer {
        invalid_issuer: (!issuer.is_empty()).then(|| issuer.to_string()),
    };

    if issuer.is_empty() {
        return Err(ValidationError::new(
            MessageDetail::new("The token has no issuer."),
            ValidationFailureType::IssuerValidationFailed,
            rejected(),
        ));
    }

    let configuration_issuer = configuration
        .and_then(|c| c.issuer())
        .filter(|i| !i.is_empty());

    if configuration_issuer == Some(issuer) {
        debug!(activity_id = %call_context.activity_id, "Issuer matched configuration");
        return Ok(ValidatedIssuer {
            issuer: issuer.to_string(),
            source: IssuerValidationSource::IssuerMatchedConfiguration,
        });
    }

    if parameters.valid_issuers.iter().any(|valid| valid == issuer) {
        debug!(activity_id = %call_context.activity_id, "Issuer matched validation parameters");
        return Ok(ValidatedIssuer {
            issuer: issuer.to_string(),
            source: IssuerValidationSource::IssuerMatchedValidationParameters,
        });
    }

    if configuration_issuer.is_none() && parameters.valid_issuers.is_empty() {
        return Err(ValidationError::new(
            MessageDetail::new(
                "Issuer validation failed: neither a configuration issuer nor valid issuers are available.",
            ),
            ValidationFailureType::IssuerValidationFailed,
            rejected(),
        ));
    }

    Err(ValidationError::new(
        MessageDetail::new("Issuer validation failed. Issuer: '{0}'. Did not match: '{1}' or '{2}'.")
            .pii_arg(issuer)
            .pii_arg(configuration_issuer.unwrap_or_default())
            .pii_arg(parameters.valid_issuers.join(", ")),
        ValidationFailureType::IssuerValidationFailed,
        rejected(),
    ))
}

/// [`IssuerValidator`] running [`validate_issuer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIssuerValidator;

#[async_trait]
impl IssuerValidator for DefaultIssuerValidator {
    async fn validate_issuer(
        &self,
        issuer: &str,
        token: &dyn SecurityToken,
        parameters: &ValidationParameters,
        configuration: Option<&dyn Configuration>,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedIssuer> {
        validate_issuer(
            issuer,
            token,
            parameters,
            configuration,
            call_context,
            cancellation,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::OpenIdConnectConfiguration;
    use crate::error::ExceptionType;
    use crate::test_support::StubToken;

    async fn check(
        issuer: &str,
        params: &ValidationParameters,
        configuration: Option<&dyn Configuration>,
    ) -> ValidationResult<ValidatedIssuer> {
        validate_issuer(
            issuer,
            &StubToken::default(),
            params,
            configuration,
            &CallContext::new(),
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_configuration_issuer_wins() {
        let config = OpenIdConnectConfiguration::new("https://login.example.com");
        let params = ValidationParameters::new().with_valid_issuers(["https://login.example.com"]);
        let validated = check("https://login.example.com", &params, Some(&config))
            .await
            .unwrap();
        assert_eq!(validated.source, IssuerValidationSource::IssuerMatchedConfiguration);
    }

    #[tokio::test]
    async fn test_valid_issuers_fallback() {
        let config = OpenIdConnectConfiguration::new("https://other.example.com");
        let params = ValidationParameters::new().with_valid_issuers(["https://login.example.com"]);
        let validated = check("https://login.example.com", &params, Some(&config))
            .await
            .unwrap();
        assert_eq!(
            validated.source,
            IssuerValidationSource::IssuerMatchedValidationParameters
        );
    }

    #[tokio::test]
    async fn test_nothing_to_compare_against() {
        let err = check("https://login.example.com", &ValidationParameters::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.exception_type(), ExceptionType::InvalidIssuer);
        assert!(err.message().to_string().contains("neither"));
    }

    #[tokio::test]
    async fn test_rejected_issuer_in_payload() {
        let params = ValidationParameters::new().with_valid_issuers(["https://good"]);
        let err = check("https://evil", &params, None).await.unwrap_err();
        match err.detail() {
            ErrorDetail::Issuer { invalid_issuer } => {
                assert_eq!(invalid_issuer.as_deref(), Some("https://evil"));
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_issuer() {
        let params = ValidationParameters::new().with_valid_issuers(["https://good"]);
        let err = check("", &params, None).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::IssuerValidationFailed);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = validate_issuer(
            "https://good",
            &StubToken::default(),
            &ValidationParameters::new(),
            None,
            &CallContext::new(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::OperationCancelled);
    }
}
