use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
    ValidationResultExt,
};
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::recovery::validate_with_recovery;
use crate::token::{
    SecurityToken, TokenHandler, TokenKind, check_token_text, record_validation_outcome,
};
use crate::validated::ValidatedToken;
use crate::validators::guard::guard;
use crate::validators::signature::{unsigned, verify_with_signing_keys};
use crate::validators::{
    ReplayCheck, run_audience, run_issuer, run_issuer_signing_key, run_lifetime, run_signature,
};

use super::{
    ProxyRestriction, SamlAssertion, SamlSignatureVerifier, SamlTokenReader, SamlVersion,
};

/// Proxy restriction check: `(restriction, assertion, parameters, context)`
pub type ProxyRestrictionValidator = Arc<
    dyn Fn(&ProxyRestriction, &SamlAssertion, &ValidationParameters, &CallContext) -> ValidationResult<()>
        + Send
        + Sync,
>;

/// Shared by the SAML 1.1 and 2.0 handlers
#[derive(Clone)]
struct SamlPipeline {
    version: SamlVersion,
    reader: Arc<dyn SamlTokenReader>,
    verifier: Arc<dyn SamlSignatureVerifier>,
    proxy_restriction_validator: Option<ProxyRestrictionValidator>,
}

impl fmt::Debug for SamlPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamlPipeline")
            .field("version", &self.version)
            .field("reader", &self.reader)
            .field("verifier", &self.verifier)
            .field(
                "proxy_restriction_validator",
                &self.proxy_restriction_validator.is_some(),
            )
            .finish()
    }
}

impl SamlPipeline {
    fn new(
        version: SamlVersion,
        reader: Arc<dyn SamlTokenReader>,
        verifier: Arc<dyn SamlSignatureVerifier>,
    ) -> Self {
        Self {
            version,
            reader,
            verifier,
            proxy_restriction_validator: None,
        }
    }

    fn read(&self, token: &str, call_context: &CallContext) -> ValidationResult<SamlAssertion> {
        let read_failed = |message: MessageDetail| {
            ValidationError::new(
                message,
                ValidationFailureType::TokenReadingFailed,
                ErrorDetail::Malformed,
            )
        };

        let mut assertion = self.reader.read_assertion(token).map_err(|error| {
            debug!(
                activity_id = %call_context.activity_id,
                error = %error,
                "Unable to read SAML assertion"
            );
            read_failed(
                MessageDetail::new("Unable to read the token as a SAML {0} assertion.")
                    .arg(self.version),
            )
            .with_shared_inner_error(Arc::from(error))
        })?;

        if assertion.version != self.version {
            return Err(read_failed(
                MessageDetail::new("The token is a SAML {0} assertion, expected SAML {1}.")
                    .arg(assertion.version)
                    .arg(self.version),
            ));
        }
        if assertion.raw.is_empty() {
            assertion.raw = token.to_string();
        }
        Ok(assertion)
    }

    async fn validate(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
        handler: Arc<dyn TokenHandler>,
    ) -> ValidationResult<ValidatedToken> {
        check_token_text(token, parameters)?;
        let assertion = Arc::new(self.read(token, call_context).add_current_stack_frame()?);

        let assertion = &assertion;
        let handler = &handler;
        let replay = &ReplayCheck::new();
        validate_with_recovery(
            parameters,
            assertion.key_id(),
            call_context,
            cancellation,
            move |configuration| {
                self.run_checks(
                    assertion,
                    replay,
                    configuration,
                    parameters,
                    call_context,
                    cancellation,
                    Arc::clone(handler),
                )
            },
        )
        .await
    }

    async fn run_checks(
        &self,
        assertion: &Arc<SamlAssertion>,
        replay: &ReplayCheck,
        configuration: Option<Arc<dyn Configuration>>,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
        handler: Arc<dyn TokenHandler>,
    ) -> ValidationResult<ValidatedToken> {
        let token: &dyn SecurityToken = &**assertion;
        let configuration_ref = configuration.as_deref();
        let conditions = assertion.conditions.as_ref();

        let lifetime = run_lifetime(
            token.not_before(),
            token.expires(),
            token,
            parameters,
            call_context,
        )
        .add_current_stack_frame()?;

        let audience = validate_audience_restrictions(assertion, parameters, call_context)
            .add_current_stack_frame()?;

        let token_replay_expiration = match conditions {
            Some(conditions) if conditions.one_time_use => replay
                .run(conditions.not_on_or_after, &assertion.id, parameters, call_context)
                .add_current_stack_frame()?,
            _ => None,
        };

        if let Some(restriction) = conditions.and_then(|c| c.proxy_restriction.as_ref()) {
            self.validate_proxy_restriction(restriction, assertion, parameters, call_context)
                .add_current_stack_frame()?;
        }

        let issuer = run_issuer(
            token.issuer().unwrap_or_default(),
            token,
            parameters,
            configuration_ref,
            call_context,
            cancellation,
        )
        .await
        .add_current_stack_frame()?;

        let signing_key = run_signature(token, parameters, configuration_ref, call_context, || {
            self.validate_signature(assertion, parameters, configuration_ref, call_context)
        })
        .add_current_stack_frame()?;

        let signing_key_lifetime = run_issuer_signing_key(
            &signing_key,
            token,
            parameters,
            configuration_ref,
            call_context,
        )
        .add_current_stack_frame()?;

        let mut validated = ValidatedToken::new(
            Arc::clone(assertion) as Arc<dyn SecurityToken>,
            handler,
            parameters.clone(),
            issuer,
        );
        validated.audience = Some(audience);
        validated.lifetime = Some(lifetime);
        validated.token_replay_expiration = token_replay_expiration;
        validated.signing_key = Some(signing_key);
        validated.signing_key_lifetime = Some(signing_key_lifetime);
        Ok(validated)
    }

    /// Accepted unless a proxy restriction validator rejects it
    fn validate_proxy_restriction(
        &self,
        restriction: &ProxyRestriction,
        assertion: &SamlAssertion,
        parameters: &ValidationParameters,
        call_context: &CallContext,
    ) -> ValidationResult<()> {
        let Some(validator) = &self.proxy_restriction_validator else {
            debug!(
                activity_id = %call_context.activity_id,
                count = ?restriction.count,
                "Proxy restriction accepted"
            );
            return Ok(());
        };
        guard(
            "proxy restriction",
            ValidationFailureType::SamlConditionsValidationFailed,
            || ErrorDetail::Generic,
            || validator(restriction, assertion, parameters, call_context),
        )
    }

    fn validate_signature(
        &self,
        assertion: &SamlAssertion,
        parameters: &ValidationParameters,
        configuration: Option<&dyn Configuration>,
        call_context: &CallContext,
    ) -> ValidationResult<SigningKey> {
        let Some(signature) = &assertion.signature else {
            return Err(unsigned());
        };
        verify_with_signing_keys(
            assertion,
            &signature.algorithm,
            parameters,
            configuration,
            call_context,
            |key| self.verifier.verify_signature(assertion, key),
        )
    }
}

/// Every audience restriction must be satisfied; the first restriction's
/// match is the validated audience
///
/// An assertion without restrictions is checked as a token without audiences.
fn validate_audience_restrictions(
    assertion: &SamlAssertion,
    parameters: &ValidationParameters,
    call_context: &CallContext,
) -> ValidationResult<String> {
    let restrictions = assertion
        .conditions
        .as_ref()
        .map(|c| c.audience_restrictions.as_slice())
        .unwrap_or_default();

    let Some((first, rest)) = restrictions.split_first() else {
        return run_audience(&[], assertion, parameters, call_context);
    };
    let audience = run_audience(&first.audiences, assertion, parameters, call_context)?;
    for restriction in rest {
        run_audience(&restriction.audiences, assertion, parameters, call_context)?;
    }
    Ok(audience)
}

/// Validates SAML 1.1 assertions
#[derive(Debug, Clone)]
pub struct SamlTokenHandler {
    pipeline: SamlPipeline,
}

impl SamlTokenHandler {
    /// Handler reading with `reader` and checking signatures with `verifier`
    pub fn new(reader: Arc<dyn SamlTokenReader>, verifier: Arc<dyn SamlSignatureVerifier>) -> Self {
        Self {
            pipeline: SamlPipeline::new(SamlVersion::V1_1, reader, verifier),
        }
    }

    /// Read a SAML 1.1 assertion without validating it
    ///
    /// # Errors
    ///
    /// `TokenReadingFailed` when the reader fails or the assertion is not SAML 1.1.
    pub fn read_assertion(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<SamlAssertion> {
        self.pipeline.read(token, call_context)
    }
}

#[async_trait]
impl TokenHandler for SamlTokenHandler {
    fn kind(&self) -> TokenKind {
        TokenKind::Saml
    }

    fn read_token(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<Arc<dyn SecurityToken>> {
        self.read_assertion(token, call_context)
            .map(|assertion| Arc::new(assertion) as Arc<dyn SecurityToken>)
    }

    async fn validate_token(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        let result = self
            .pipeline
            .validate(
                token,
                parameters,
                call_context,
                cancellation,
                Arc::new(self.clone()),
            )
            .await;
        record_validation_outcome(TokenKind::Saml, &result, call_context);
        result
    }
}

/// Validates SAML 2.0 assertions
#[derive(Debug, Clone)]
pub struct Saml2TokenHandler {
    pipeline: SamlPipeline,
}

impl Saml2TokenHandler {
    /// Handler reading with `reader` and checking signatures with `verifier`
    pub fn new(reader: Arc<dyn SamlTokenReader>, verifier: Arc<dyn SamlSignatureVerifier>) -> Self {
        Self {
            pipeline: SamlPipeline::new(SamlVersion::V2_0, reader, verifier),
        }
    }

    /// Check `<ProxyRestriction>` with `validator`; by default it is accepted
    pub fn with_proxy_restriction_validator(mut self, validator: ProxyRestrictionValidator) -> Self {
        self.pipeline.proxy_restriction_validator = Some(validator);
        self
    }

    /// Read a SAML 2.0 assertion without validating it
    ///
    /// # Errors
    ///
    /// `TokenReadingFailed` when the reader fails or the assertion is not SAML 2.0.
    pub fn read_assertion(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<SamlAssertion> {
        self.pipeline.read(token, call_context)
    }
}

#[async_trait]
impl TokenHandler for Saml2TokenHandler {
    fn kind(&self) -> TokenKind {
        TokenKind::Saml2
    }

    fn read_token(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<Arc<dyn SecurityToken>> {
        self.read_assertion(token, call_context)
            .map(|assertion| Arc::new(assertion) as Arc<dyn SecurityToken>)
    }

    async fn validate_token(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        let result = self
            .pipeline
            .validate(
                token,
                parameters,
                call_context,
                cancellation,
                Arc::new(self.clone()),
            )
            .await;
        record_validation_outcome(TokenKind::Saml2, &result, call_context);
        result
    }
}
