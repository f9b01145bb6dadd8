use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::configuration::Configuration;
use crate::context::CallContext;
use crate::error::{
    ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
    ValidationResultExt,
};
use crate::jwt::JsonWebToken;
use crate::jwt::signature::validate_signature;
use crate::parameters::ValidationParameters;
use crate::recovery::validate_with_recovery;
use crate::token::{
    SecurityToken, TokenHandler, TokenKind, check_token_text, record_validation_outcome,
};
use crate::validated::ValidatedToken;
use crate::validators::{
    ReplayCheck, run_audience, run_issuer, run_issuer_signing_key, run_lifetime, run_signature,
    run_token_type,
};

/// Decrypts JWE tokens
///
/// Key management and content encryption are left to the implementation; the
/// handler only needs the compact serialization of the decrypted token.
pub trait TokenDecryptor: Send + Sync + Debug {
    /// Decrypt `jwt` and return the inner token text
    ///
    /// # Errors
    ///
    /// Any error; it becomes the inner error of a `TokenDecryptionFailed` failure.
    fn decrypt(
        &self,
        jwt: &JsonWebToken,
        parameters: &ValidationParameters,
        call_context: &CallContext,
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;
}

/// Reads and validates JWTs
///
/// ```rust,no_run
/// use idguard::jwt::JsonWebTokenHandler;
/// use idguard::keys::SigningKey;
/// use idguard::token::TokenHandler;
/// use idguard::{CallContext, ValidationParameters};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let parameters = ValidationParameters::new()
///     .with_valid_audiences(["api://orders"])
///     .with_valid_issuers(["https://login.example.com"])
///     .with_issuer_signing_key(SigningKey::symmetric(b"shared-secret".to_vec()));
///
/// let validated = JsonWebTokenHandler::new()
///     .validate_token(token, &parameters, &CallContext::new(), &CancellationToken::new())
///     .await?;
/// println!("subject: {:?}", validated.claims_identity().name());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonWebTokenHandler {
    decryptor: Option<Arc<dyn TokenDecryptor>>,
}

impl JsonWebTokenHandler {
    /// Handler for signed tokens only
    pub fn new() -> Self {
        Self::default()
    }

    /// Decrypt JWE tokens with `decryptor`
    pub fn with_decryptor(mut self, decryptor: Arc<dyn TokenDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Read a compact JWT without validating it
    ///
    /// # Errors
    ///
    /// `TokenReadingFailed` with the [`TokenReadError`](crate::jwt::TokenReadError) as inner error.
    pub fn read_json_web_token(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<JsonWebToken> {
        JsonWebToken::parse(token).map_err(|error| {
            debug!(activity_id = %call_context.activity_id, error = %error, "Unable to read JWT");
            ValidationError::new(
                MessageDetail::new("Unable to read the token as a JWT: {0}").arg(&error),
                ValidationFailureType::TokenReadingFailed,
                ErrorDetail::Malformed,
            )
            .with_inner_error(error)
        })
    }

    async fn validate_token_text(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        check_token_text(token, parameters)?;

        let jwt = self
            .read_json_web_token(token, call_context)
            .add_current_stack_frame()?;
        if !jwt.is_encrypted() {
            return self
                .validate_jws(Arc::new(jwt), parameters, call_context, cancellation)
                .await;
        }

        let inner = Arc::new(self.decrypt(&jwt, parameters, call_context)?);
        let mut validated = self
            .validate_jws(Arc::clone(&inner), parameters, call_context, cancellation)
            .await
            .add_current_stack_frame()?;
        validated.security_token = Arc::new(jwt.with_inner_token(inner));
        Ok(validated)
    }

    fn decrypt(
        &self,
        jwt: &JsonWebToken,
        parameters: &ValidationParameters,
        call_context: &CallContext,
    ) -> ValidationResult<JsonWebToken> {
        let decryption_failed = |message: MessageDetail| {
            ValidationError::new(
                message,
                ValidationFailureType::TokenDecryptionFailed,
                ErrorDetail::Decryption,
            )
        };

        let Some(decryptor) = &self.decryptor else {
            return Err(decryption_failed(MessageDetail::new(
                "The token is encrypted and no token decryptor is configured.",
            )));
        };
        let plaintext = decryptor
            .decrypt(jwt, parameters, call_context)
            .map_err(|error| {
                decryption_failed(
                    MessageDetail::new("Decrypting the token failed. enc: '{0}'.")
                        .arg(jwt.encryption_algorithm().unwrap_or("<none>")),
                )
                .with_shared_inner_error(Arc::from(error))
            })?;

        let inner = self
            .read_json_web_token(&plaintext, call_context)
            .add_current_stack_frame()?;
        if inner.is_encrypted() {
            return Err(decryption_failed(MessageDetail::new(
                "The decrypted token is itself encrypted; nested encryption is not supported.",
            )));
        }
        Ok(inner)
    }

    async fn validate_jws(
        &self,
        jwt: Arc<JsonWebToken>,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        let jwt = &jwt;
        let replay = &ReplayCheck::new();
        validate_with_recovery(
            parameters,
            jwt.key_id(),
            call_context,
            cancellation,
            move |configuration| {
                self.run_checks(jwt, replay, configuration, parameters, call_context, cancellation)
            },
        )
        .await
    }

    async fn run_checks(
        &self,
        jwt: &Arc<JsonWebToken>,
        replay: &ReplayCheck,
        configuration: Option<Arc<dyn Configuration>>,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        let token: &dyn SecurityToken = &**jwt;
        let configuration_ref = configuration.as_deref();

        let lifetime = run_lifetime(
            token.not_before(),
            token.expires(),
            token,
            parameters,
            call_context,
        )
        .add_current_stack_frame()?;

        let audience = run_audience(&token.audiences(), token, parameters, call_context)
            .add_current_stack_frame()?;

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

        let token_replay_expiration = replay
            .run(token.expires(), token.raw(), parameters, call_context)
            .add_current_stack_frame()?;

        let actor = match jwt.actor_token() {
            Some(actor_token) if parameters.validate_actor => Some(Box::new(
                self.validate_actor(actor_token, parameters.actor_parameters(), call_context, cancellation)
                    .await
                    .add_current_stack_frame()?,
            )),
            _ => None,
        };

        let token_type = run_token_type(token.token_type(), token, parameters, call_context)
            .add_current_stack_frame()?;

        let signing_key = run_signature(token, parameters, configuration_ref, call_context, || {
            validate_signature(jwt, parameters, configuration_ref, call_context)
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
            Arc::clone(jwt) as Arc<dyn SecurityToken>,
            Arc::new(self.clone()),
            parameters.clone(),
            issuer,
        );
        validated.audience = Some(audience);
        validated.lifetime = Some(lifetime);
        validated.token_replay_expiration = token_replay_expiration;
        validated.token_type = Some(token_type);
        validated.signing_key = Some(signing_key);
        validated.signing_key_lifetime = Some(signing_key_lifetime);
        validated.actor = actor;
        Ok(validated)
    }

    fn validate_actor<'a>(
        &'a self,
        actor_token: &'a str,
        parameters: &'a ValidationParameters,
        call_context: &'a CallContext,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, ValidationResult<ValidatedToken>> {
        Box::pin(async move {
            self.validate_token_text(actor_token, parameters, call_context, cancellation)
                .await
                .map_err(|error| {
                    debug!(
                        activity_id = %call_context.activity_id,
                        error = %error,
                        "Actor token rejected"
                    );
                    ValidationError::new(
                        MessageDetail::new("The actor token failed validation."),
                        ValidationFailureType::ActorTokenValidationFailed,
                        error.detail().clone(),
                    )
                    .with_inner_error(error)
                })
        })
    }
}

#[async_trait]
impl TokenHandler for JsonWebTokenHandler {
    fn kind(&self) -> TokenKind {
        TokenKind::Jwt
    }

    fn read_token(
        &self,
        token: &str,
        call_context: &CallContext,
    ) -> ValidationResult<Arc<dyn SecurityToken>> {
        self.read_json_web_token(token, call_context)
            .map(|jwt| Arc::new(jwt) as Arc<dyn SecurityToken>)
    }

    async fn validate_token(
        &self,
        token: &str,
        parameters: &ValidationParameters,
        call_context: &CallContext,
        cancellation: &CancellationToken,
    ) -> ValidationResult<ValidatedToken> {
        let result = self
            .validate_token_text(token, parameters, call_context, cancellation)
            .await;
        record_validation_outcome(TokenKind::Jwt, &result, call_context);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Claim, ClaimsIdentity};
    use crate::configuration::{OpenIdConnectConfiguration, StaticConfigurationManager};
    use crate::error::ExceptionType;
    use crate::keys::SigningKey;
    use crate::replay_cache::InMemoryTokenReplayCache;
    use crate::test_support::sign_hs256;
    use crate::validators::IssuerValidationSource;
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use std::io;

    const SECRET: &[u8] = b"a-very-long-shared-secret-for-hmac-tests";
    const ISSUER: &str = "https://login.example.com";

    fn claims(extra: Value) -> Value {
        let now = Utc::now().timestamp();
        let mut claims = json!({
            "iss": ISSUER,
            "aud": "api://orders",
            "sub": "alice",
            "name": "Alice",
            "role": ["reader", "writer"],
            "nbf": now - 60,
            "exp": now + 3600,
        });
        if let (Some(target), Value::Object(extra)) = (claims.as_object_mut(), extra) {
            target.extend(extra);
        }
        claims
    }

    fn params() -> ValidationParameters {
        ValidationParameters::new()
            .with_valid_audiences(["api://orders"])
            .with_valid_issuers([ISSUER])
            .with_issuer_signing_key(SigningKey::symmetric(SECRET).with_key_id("k1"))
    }

    async fn validate(token: &str, parameters: &ValidationParameters) -> ValidationResult<ValidatedToken> {
        JsonWebTokenHandler::new()
            .validate_token(token, parameters, &CallContext::new(), &CancellationToken::new())
            .await
    }

    #[derive(Debug)]
    struct FixedDecryptor(Result<String, String>);

    impl TokenDecryptor for FixedDecryptor {
        fn decrypt(
            &self,
            _jwt: &JsonWebToken,
            _parameters: &ValidationParameters,
            _call_context: &CallContext,
        ) -> Result<String, Box<dyn StdError + Send + Sync>> {
            self.0
                .clone()
                .map_err(|message| Box::new(io::Error::other(message)) as Box<dyn StdError + Send + Sync>)
        }
    }

    // {"alg":"dir","enc":"A256GCM"} with opaque key, iv, ciphertext and tag
    const JWE: &str = "eyJhbGciOiJkaXIiLCJlbmMiOiJBMjU2R0NNIn0..aXY.Y2lwaGVy.dGFn";

    #[tokio::test]
    async fn test_valid_token() {
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));
        let validated = validate(&token, &params()).await.unwrap();

        assert_eq!(validated.audience(), Some("api://orders"));
        assert_eq!(validated.issuer().issuer, ISSUER);
        assert_eq!(
            validated.issuer().source,
            IssuerValidationSource::IssuerMatchedValidationParameters
        );
        assert_eq!(validated.signing_key().and_then(SigningKey::key_id), Some("k1"));
        assert!(validated.configuration().is_none());
        assert!(!validated.configuration_refreshed());
    }

    #[tokio::test]
    async fn test_claims_are_built_lazily_and_cached() {
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));
        let mut validated = validate(&token, &params()).await.unwrap();

        let identity = validated.claims_identity();
        assert_eq!(identity.name(), Some("Alice"));
        assert!(identity.is_in_role("writer"));
        assert_eq!(identity.find_first("sub").and_then(|c| c.issuer.as_deref()), Some(ISSUER));
        assert!(std::ptr::eq(identity, validated.claims_identity()));
        assert_eq!(validated.claims()["role"], json!(["reader", "writer"]));

        validated.set_claims_identity(
            ClaimsIdentity::new("Custom").with_claim(Claim::new("sub", "bob")),
        );
        assert_eq!(validated.claims()["sub"], json!("bob"));
        assert!(!validated.claims().contains_key("role"));
    }

    #[tokio::test]
    async fn test_contract_failures() {
        let err = validate("", &params()).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::NullArgument);

        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));
        let err = validate(&token, &params().with_maximum_token_size(10))
            .await
            .unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::TokenExceedsMaximumSize);

        let err = validate("not.a", &params()).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::TokenReadingFailed);
        assert_eq!(err.exception_type(), ExceptionType::Malformed);
        assert!(err.inner_error().is_some());
    }

    #[tokio::test]
    async fn test_lifetime_is_checked_before_audience() {
        let now = Utc::now();
        let token = sign_hs256(
            SECRET,
            Some("k1"),
            &claims(json!({
                "aud": "api://someone-else",
                "nbf": (now - Duration::hours(2)).timestamp(),
                "exp": (now - Duration::hours(1)).timestamp(),
            })),
        );
        let err = validate(&token, &params()).await.unwrap_err();
        assert_eq!(err.exception_type(), ExceptionType::Expired);
        assert!(err.stack_frames().len() >= 2);
    }

    #[tokio::test]
    async fn test_wrong_key_fails_signature() {
        let token = sign_hs256(b"a-different-secret-of-some-length", Some("k1"), &claims(json!({})));
        let err = validate(&token, &params()).await.unwrap_err();
        assert_eq!(err.exception_type(), ExceptionType::InvalidSignature);
    }

    #[tokio::test]
    async fn test_replayed_token_is_rejected() {
        let mut parameters = params();
        parameters.token_replay_cache = Some(Arc::new(InMemoryTokenReplayCache::new()));
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));

        let first = validate(&token, &parameters).await.unwrap();
        assert!(first.token_replay_expiration().is_some());

        let err = validate(&token, &parameters).await.unwrap_err();
        assert_eq!(err.exception_type(), ExceptionType::ReplayDetected);
    }

    #[tokio::test]
    async fn test_actor_token_is_validated() {
        let actor = sign_hs256(SECRET, Some("k1"), &claims(json!({"name": "orders-service"})));
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({"actort": actor})));
        let mut parameters = params();
        parameters.validate_actor = true;

        let validated = validate(&token, &parameters).await.unwrap();
        let actor = validated.actor().expect("actor");
        assert_eq!(actor.claims_identity().name(), Some("orders-service"));
        assert_eq!(
            validated.claims_identity().actor().and_then(ClaimsIdentity::name),
            Some("orders-service")
        );

        parameters.validate_actor = false;
        assert!(validate(&token, &parameters).await.unwrap().actor().is_none());
    }

    #[tokio::test]
    async fn test_invalid_actor_token() {
        let actor = sign_hs256(b"the-actor-signed-with-another-key", Some("k1"), &claims(json!({})));
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({"actort": actor})));
        let mut parameters = params();
        parameters.validate_actor = true;

        let err = validate(&token, &parameters).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::ActorTokenValidationFailed);
        assert_eq!(err.exception_type(), ExceptionType::InvalidSignature);
        assert!(err.inner_error().is_some());

        // raised in validate_actor, then framed by the actor step
        let frames = err.stack_frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame.file.ends_with("handler.rs")));
        assert!(frames[0].line > frames[1].line);
    }

    #[tokio::test]
    async fn test_configuration_supplies_issuer_and_keys() {
        let configuration = OpenIdConnectConfiguration::new(ISSUER)
            .with_signing_key(SigningKey::symmetric(SECRET).with_key_id("k1"));
        let parameters = ValidationParameters::new()
            .with_valid_audiences(["api://orders"])
            .with_configuration_manager(Arc::new(StaticConfigurationManager::new(configuration)));

        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));
        let validated = validate(&token, &parameters).await.unwrap();
        assert_eq!(
            validated.issuer().source,
            IssuerValidationSource::IssuerMatchedConfiguration
        );
        let used = validated.configuration().expect("configuration");
        assert_eq!(used.issuer(), Some(ISSUER));
    }

    #[tokio::test]
    async fn test_signature_override_panic_is_captured() {
        let mut parameters = params();
        parameters.validators.signature = Some(Arc::new(
            |_token: &dyn SecurityToken,
             _parameters: &ValidationParameters,
             _configuration: Option<&dyn Configuration>,
             _call_context: &CallContext|
             -> ValidationResult<SigningKey> { panic!("key vault unavailable") },
        ));
        let token = sign_hs256(SECRET, Some("k1"), &claims(json!({})));

        let err = validate(&token, &parameters).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::SignatureValidatorThrew);
        assert_eq!(err.exception_type(), ExceptionType::InvalidSignature);
    }

    #[tokio::test]
    async fn test_encrypted_token_without_decryptor() {
        let err = validate(JWE, &params()).await.unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::TokenDecryptionFailed);
        assert_eq!(err.exception_type(), ExceptionType::DecryptionFailed);
    }

    #[tokio::test]
    async fn test_encrypted_token_is_validated_through_inner_token() {
        let inner = sign_hs256(SECRET, Some("k1"), &claims(json!({})));
        let handler =
            JsonWebTokenHandler::new().with_decryptor(Arc::new(FixedDecryptor(Ok(inner))));

        let validated = handler
            .validate_token(JWE, &params(), &CallContext::new(), &CancellationToken::new())
            .await
            .unwrap();
        let outer = validated
            .security_token()
            .downcast_ref::<JsonWebToken>()
            .expect("JWT");
        assert!(outer.is_encrypted());
        assert_eq!(outer.raw(), JWE);
        assert_eq!(outer.subject(), Some("alice"));
        assert!(outer.inner_token().is_some());
        assert_eq!(validated.claims_identity().name(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_decryptor_failure_is_wrapped() {
        let handler = JsonWebTokenHandler::new()
            .with_decryptor(Arc::new(FixedDecryptor(Err("unknown key".into()))));

        let err = handler
            .validate_token(JWE, &params(), &CallContext::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.failure_type(), ValidationFailureType::TokenDecryptionFailed);
        assert_eq!(
            err.inner_error().map(ToString::to_string).as_deref(),
            Some("unknown key")
        );
    }
}
