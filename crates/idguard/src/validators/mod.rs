//! Per-check validators
//!
//! Each check has a default implementation (a free function in its submodule)
//! and can be replaced per call through [`Validators`] on
//! [`ValidationParameters`](crate::parameters::ValidationParameters).
//! Overrides are called through a panic guard; a panicking override yields a
//! `*ValidatorThrew` error instead of unwinding into the caller.

mod algorithm;
mod audience;
pub(crate) mod guard;
mod issuer;
mod issuer_signing_key;
mod lifetime;
pub(crate) mod signature;
mod token_replay;
mod token_type;

pub use algorithm::validate_algorithm;
pub use audience::validate_audience;
pub use guard::ValidatorPanic;
pub use issuer::{DefaultIssuerValidator, validate_issuer};
pub use issuer_signing_key::validate_issuer_signing_key;
pub use lifetime::validate_lifetime;
pub use token_replay::validate_token_replay;
pub use token_type::validate_token_type;

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    AudienceFailure, ErrorDetail, LifetimeFailure, LifetimeFailureKind, SignatureFailureKind,
    SigningKeyFailure, SigningKeyFailureKind, StackFrame, ValidationFailureType,
    ValidationResult,
};
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::SecurityToken;

/// Where a validated issuer was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerValidationSource {
    /// Issuer accepted without comparison (custom validator)
    NotValidated,
    /// Matched the configuration's issuer
    IssuerMatchedConfiguration,
    /// Matched one of the parameters' valid issuers
    IssuerMatchedValidationParameters,
}

/// Outcome of issuer validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIssuer {
    /// The accepted issuer
    pub issuer: String,
    /// What it matched
    pub source: IssuerValidationSource,
}

/// Outcome of lifetime validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedLifetime {
    /// Token `nbf`
    pub not_before: Option<DateTime<Utc>>,
    /// Token `exp`
    pub expires: Option<DateTime<Utc>>,
}

/// Outcome of issuer signing key validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedSigningKeyLifetime {
    /// Key validity start
    pub valid_from: Option<DateTime<Utc>>,
    /// Key validity end
    pub valid_to: Option<DateTime<Utc>>,
    /// When the key was checked
    pub validation_time: DateTime<Utc>,
}

/// Outcome of token type validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTokenType {
    /// The accepted type, absent when any type was allowed and none was present
    pub token_type: Option<String>,
    /// Number of allowed types at validation time (0 = any)
    pub valid_types_count: usize,
}

/// Audience check: `(token audiences, token, parameters, context) -> matched audience`
pub type AudienceValidator = Arc<
    dyn Fn(&[String], &dyn SecurityToken, &ValidationParameters, &CallContext) -> ValidationResult<String>
        + Send
        + Sync,
>;

/// Lifetime check: `(not_before, expires, token, parameters, context)`
pub type LifetimeValidator = Arc<
    dyn Fn(
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
            &dyn SecurityToken,
            &ValidationParameters,
            &CallContext,
        ) -> ValidationResult<ValidatedLifetime>
        + Send
        + Sync,
>;

/// Replay check: `(expiration, replay key, parameters, context) -> expiration`
///
/// The replay key is the raw token for JWTs and the assertion id for SAML.
pub type TokenReplayValidator = Arc<
    dyn Fn(
            Option<DateTime<Utc>>,
            &str,
            &ValidationParameters,
            &CallContext,
        ) -> ValidationResult<Option<DateTime<Utc>>>
        + Send
        + Sync,
>;

/// Algorithm check: `(algorithm, key, token, parameters, context) -> algorithm`
pub type AlgorithmValidator = Arc<
    dyn Fn(
            &str,
            &SigningKey,
            &dyn SecurityToken,
            &ValidationParameters,
            &CallContext,
        ) -> ValidationResult<String>
        + Send
        + Sync,
>;

/// Token type check: `(typ, token, parameters, context)`
pub type TokenTypeValidator = Arc<
    dyn Fn(
            Option<&str>,
            &dyn SecurityToken,
            &ValidationParameters,
            &CallContext,
        ) -> ValidationResult<ValidatedTokenType>
        + Send
        + Sync,
>;

/// Signing key check: `(key, token, parameters, configuration, context)`
pub type IssuerSigningKeyValidator = Arc<
    dyn Fn(
            &SigningKey,
            &dyn SecurityToken,
            &ValidationParameters,
            Option<&dyn Configuration>,
            &CallContext,
        ) -> ValidationResult<ValidatedSigningKeyLifetime>
        + Send
        + Sync,
>;

/// Signature check replacing key resolution and verification entirely;
/// returns the key that verified the token
pub type SignatureValidator = Arc<
    dyn Fn(
            &dyn SecurityToken,
            &ValidationParameters,
            Option<&dyn Configuration>,
            &CallContext,
        ) -> ValidationResult<SigningKey>
        + Send
        + Sync,
>;

/// Key resolution: `(raw token, token, kid, parameters, configuration, context) -> candidates`
pub type IssuerSigningKeyResolver = Arc<
    dyn Fn(
            &str,
            &dyn SecurityToken,
            Option<&str>,
            &ValidationParameters,
            Option<&dyn Configuration>,
            &CallContext,
        ) -> Vec<SigningKey>
        + Send
        + Sync,
>;

/// Asynchronous issuer check
#[async_trait]
pub trait IssuerValidator: Send + Sync {
    /// Accept or reject `issuer`
    async fn validate_issuer(
        &self,
        issuer: &str,
        token: &dyn SecurityToken,
        parameters: &ValidationParameters,
        configuration: Option<&dyn Configuration>,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedIssuer>;
}

/// Validator overrides; `None` selects the default
#[derive(Clone, Default)]
pub struct Validators {
    /// Audience override
    pub audience: Option<AudienceValidator>,
    /// Issuer override
    pub issuer: Option<Arc<dyn IssuerValidator>>,
    /// Lifetime override
    pub lifetime: Option<LifetimeValidator>,
    /// Token replay override
    pub token_replay: Option<TokenReplayValidator>,
    /// Algorithm override
    pub algorithm: Option<AlgorithmValidator>,
    /// Token type override
    pub token_type: Option<TokenTypeValidator>,
    /// Signing key override
    pub issuer_signing_key: Option<IssuerSigningKeyValidator>,
    /// Signature override
    pub signature: Option<SignatureValidator>,
    /// Key resolution override
    pub issuer_signing_key_resolver: Option<IssuerSigningKeyResolver>,
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validators")
            .field("audience", &self.audience.is_some())
            .field("issuer", &self.issuer.is_some())
            .field("lifetime", &self.lifetime.is_some())
            .field("token_replay", &self.token_replay.is_some())
            .field("algorithm", &self.algorithm.is_some())
            .field("token_type", &self.token_type.is_some())
            .field("issuer_signing_key", &self.issuer_signing_key.is_some())
            .field("signature", &self.signature.is_some())
            .field(
                "issuer_signing_key_resolver",
                &self.issuer_signing_key_resolver.is_some(),
            )
            .finish()
    }
}

// Dispatch to the override when one is set, else the default. Overrides run
// under a panic guard whose origin frame is the dispatcher's caller.

#[track_caller]
pub(crate) fn run_audience(
    token_audiences: &[String],
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<String> {
    match &parameters.validators.audience {
        Some(validator) => guard::guard(
            "audience",
            ValidationFailureType::AudienceValidatorThrew,
            || {
                ErrorDetail::Audience(AudienceFailure {
                    token_audiences: token_audiences.to_vec(),
                    valid_audiences: parameters.valid_audiences.clone(),
                })
            },
            || validator(token_audiences, token, parameters, call_context),
        ),
        None => validate_audience(token_audiences, token, parameters, call_context),
    }
}

#[track_caller]
pub(crate) fn run_lifetime(
    not_before: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<ValidatedLifetime> {
    match &parameters.validators.lifetime {
        Some(validator) => guard::guard(
            "lifetime",
            ValidationFailureType::LifetimeValidatorThrew,
            || {
                ErrorDetail::Lifetime(LifetimeFailure {
                    kind: LifetimeFailureKind::InvalidLifetime,
                    not_before,
                    expires,
                })
            },
            || validator(not_before, expires, token, parameters, call_context),
        ),
        None => validate_lifetime(not_before, expires, token, parameters, call_context),
    }
}

#[track_caller]
pub(crate) fn run_token_replay(
    expiration: Option<DateTime<Utc>>,
    replay_key: &str,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<Option<DateTime<Utc>>> {
    match &parameters.validators.token_replay {
        Some(validator) => guard::guard(
            "token replay",
            ValidationFailureType::TokenReplayValidatorThrew,
            || ErrorDetail::Generic,
            || validator(expiration, replay_key, parameters, call_context),
        ),
        None => validate_token_replay(expiration, replay_key, parameters, call_context),
    }
}

/// Replay outcome shared by the attempts of one validation
///
/// The replay check records the token, so only the first attempt that reaches
/// it runs the check; recovery attempts reuse that outcome.
#[derive(Debug, Default)]
pub(crate) struct ReplayCheck {
    outcome: OnceLock<ValidationResult<Option<DateTime<Utc>>>>,
}

impl ReplayCheck {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub(crate) fn run(
        &self,
        expiration: Option<DateTime<Utc>>,
        replay_key: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
    ) -> ValidationResult<Option<DateTime<Utc>>> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }
        let outcome = run_token_replay(expiration, replay_key, parameters, call_context);
        self.outcome.get_or_init(|| outcome).clone()
    }
}

#[track_caller]
pub(crate) fn run_algorithm(
    algorithm: &str,
    key: &SigningKey,
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<String> {
    match &parameters.validators.algorithm {
        Some(validator) => guard::guard(
            "algorithm",
            ValidationFailureType::AlgorithmValidatorThrew,
            || ErrorDetail::Algorithm {
                invalid_algorithm: Some(algorithm.to_string()),
            },
            || validator(algorithm, key, token, parameters, call_context),
        ),
        None => validate_algorithm(algorithm, key, token, parameters, call_context),
    }
}

#[track_caller]
pub(crate) fn run_token_type(
    token_type: Option<&str>,
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<ValidatedTokenType> {
    match &parameters.validators.token_type {
        Some(validator) => guard::guard(
            "token type",
            ValidationFailureType::TokenTypeValidatorThrew,
            || ErrorDetail::TokenType {
                invalid_type: token_type.map(str::to_string),
            },
            || validator(token_type, token, parameters, call_context),
        ),
        None => validate_token_type(token_type, token, parameters, call_context),
    }
}

#[track_caller]
pub(crate) fn run_issuer_signing_key(
    key: &SigningKey,
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
) -> ValidationResult<ValidatedSigningKeyLifetime> {
    match &parameters.validators.issuer_signing_key {
        Some(validator) => guard::guard(
            "issuer signing key",
            ValidationFailureType::IssuerSigningKeyValidatorThrew,
            || {
                ErrorDetail::IssuerSigningKey(SigningKeyFailure {
                    kind: SigningKeyFailureKind::Invalid,
                    key_id: key.key_id().map(str::to_string),
                    not_before: key.not_before(),
                    not_after: key.not_after(),
                })
            },
            || validator(key, token, parameters, configuration, call_context),
        ),
        None => validate_issuer_signing_key(key, token, parameters, configuration, call_context),
    }
}

pub(crate) async fn run_issuer(
    issuer: &str,
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
    cancellation: &CancellationToken,
) -> ValidationResult<ValidatedIssuer> {
    match &parameters.validators.issuer {
        Some(validator) => {
            guard::guard_async(
                StackFrame::current(),
                "issuer",
                ValidationFailureType::IssuerValidatorThrew,
                || ErrorDetail::Issuer {
                    invalid_issuer: Some(issuer.to_string()),
                },
                validator.validate_issuer(
                    issuer,
                    token,
                    parameters,
                    configuration,
                    call_context,
                    cancellation,
                ),
            )
            .await
        }
        None => {
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
}

/// Signature override when set, else the format's default check
#[track_caller]
pub(crate) fn run_signature(
    token: &dyn SecurityToken,
    parameters: &ValidationParameters,
    configuration: Option<&dyn Configuration>,
    call_context: &CallContext,
    default: impl FnOnce() -> ValidationResult<SigningKey>,
) -> ValidationResult<SigningKey> {
    match &parameters.validators.signature {
        Some(validator) => guard::guard(
            "signature",
            ValidationFailureType::SignatureValidatorThrew,
            || signature::signature_detail(SignatureFailureKind::Invalid, None),
            || validator(token, parameters, configuration, call_context),
        ),
        None => default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay_cache::InMemoryTokenReplayCache;
    use chrono::Duration;

    #[test]
    fn test_replay_check_records_once_per_validation() {
        let cache = Arc::new(InMemoryTokenReplayCache::new());
        let parameters = ValidationParameters::new().with_token_replay_cache(cache.clone());
        let ctx = CallContext::new();
        let expires = Some(Utc::now() + Duration::hours(1));

        let replay = ReplayCheck::new();
        assert_eq!(replay.run(expires, "t", &parameters, &ctx).unwrap(), expires);
        assert_eq!(replay.run(expires, "t", &parameters, &ctx).unwrap(), expires);
        assert_eq!(cache.len(), 1);

        let err = ReplayCheck::new()
            .run(expires, "t", &parameters, &ctx)
            .unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::TokenReplayValidationFailed);
    }
}
