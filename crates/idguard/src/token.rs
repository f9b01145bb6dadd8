//! Token and handler abstractions shared by the JWT and SAML pipelines

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::claims::{Claim, ClaimsIdentity};
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
};
use crate::parameters::ValidationParameters;
use crate::validated::ValidatedToken;

/// Token formats handled by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// JSON Web Token (JWS or JWE compact serialization)
    Jwt,
    /// SAML 1.1 assertion
    Saml,
    /// SAML 2.0 assertion
    Saml2,
}

impl TokenKind {
    /// Lowercase name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Jwt => "jwt",
            TokenKind::Saml => "saml",
            TokenKind::Saml2 => "saml2",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, not yet validated security token
pub trait SecurityToken: Any + Send + Sync + Debug {
    /// Format of this token
    fn kind(&self) -> TokenKind;

    /// Token identifier (`jti`, assertion id)
    fn id(&self) -> Option<&str>;

    /// Issuer claimed by the token
    fn issuer(&self) -> Option<&str>;

    /// Audiences claimed by the token
    fn audiences(&self) -> Vec<String>;

    /// Start of the validity window
    fn not_before(&self) -> Option<DateTime<Utc>>;

    /// End of the validity window
    fn expires(&self) -> Option<DateTime<Utc>>;

    /// Token type (`typ` header); formats without one return `None`
    fn token_type(&self) -> Option<&str> {
        None
    }

    /// Id of the key the token claims to be signed with
    fn key_id(&self) -> Option<&str>;

    /// Signature algorithm the token claims
    fn algorithm(&self) -> Option<&str>;

    /// Original serialized form, as received
    fn raw(&self) -> &str;

    /// Claims carried by the token
    fn claims(&self) -> Vec<Claim>;
}

impl dyn SecurityToken {
    /// Downcast to a concrete token type
    pub fn downcast_ref<T: SecurityToken>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }
}

/// Reads and validates one token format
#[async_trait]
pub trait TokenHandler: Send + Sync + Debug {
    /// Format handled
    fn kind(&self) -> TokenKind;

    /// Parse a token without validating it
    ///
    /// # Errors
    ///
    /// Returns a `TokenReadingFailed` error when the text is not a token of this format.
    fn read_token(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<Arc<dyn SecurityToken>>;

    /// Validate a serialized token
    ///
    /// # Errors
    ///
    /// Returns the first failing check, after configuration refresh and
    /// last-known-good recovery have been attempted.
    async fn validate_token(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken>;

    /// Map a validated token to a claims identity
    fn create_claims_identity(&self, validated: &ValidatedToken) -> ClaimsIdentity {
        ClaimsIdentity::from_validated_token(validated)
    }
}

/// Reject empty and oversized token text before it is read
#[track_caller]
pub(crate) fn check_token_text(token: &str, parameters: &ValidationParameters) -> ValidationResult<()> {
    if token.is_empty() {
        return Err(ValidationError::null_argument("token"));
    }
    if token.len() > parameters.maximum_token_size_in_bytes {
        return Err(ValidationError::new(
            MessageDetail::new("The token is {0} bytes, larger than the maximum of {1} bytes.")
                .arg(token.len())
                .arg(parameters.maximum_token_size_in_bytes),
            ValidationFailureType::TokenExceedsMaximumSize,
            ErrorDetail::Generic,
        ));
    }
    Ok(())
}

/// Log and count the outcome of a `validate_token` call
pub(crate) fn record_validation_outcome(
    kind: TokenKind,
    result: &ValidationResult<ValidatedToken>,
    call_context: &CallContext,
) {
    crate::metrics::record_token_validation(kind.as_str(), result.is_ok());
    match result {
        Ok(validated) => tracing::debug!(
            activity_id = %call_context.activity_id,
            token_type = %kind,
            issuer = %validated.issuer().issuer,
            configuration_refreshed = validated.configuration_refreshed(),
            "Token validated"
        ),
        Err(error) => tracing::warn!(
            activity_id = %call_context.activity_id,
            token_type = %kind,
            failure_type = %error.failure_type(),
            error = %error,
            "Token validation failed"
        ),
    }
}
