//! SAML assertion validation with issuer configurations
//!
//! Tests cover:
//! - SAML 2.0 assertions validated against a managed configuration
//! - Key rotation recovery for SAML signatures
//! - One-time-use assertions with a shared replay cache, also across a key
//!   rotation retry
//! - Dispatch to the right handler by token kind

mod common;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{AUDIENCE, ISSUER, KEY_2025, KEY_2026, RotatingRetriever, TestKey};
use idguard::configuration::{
    ConfigurationManager, OpenIdConnectConfiguration, StaticConfigurationManager,
};
use idguard::jwt::JsonWebTokenHandler;
use idguard::keys::SigningKey;
use idguard::replay_cache::InMemoryTokenReplayCache;
use idguard::saml::{
    AudienceRestriction, NAME_IDENTIFIER_CLAIM, Saml2TokenHandler, SamlAssertion, SamlConditions,
    SamlSignatureInfo, SamlSignatureVerifier, SamlTokenHandler, SamlTokenReader, SamlVersion,
};
use idguard::{
    CallContext, ExceptionType, TokenHandler, TokenKind, ValidatedToken, ValidationParameters,
    ValidationResult,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

/// Assertions travel as JSON in these tests
#[derive(Debug)]
struct JsonReader;

impl SamlTokenReader for JsonReader {
    fn read_assertion(&self, token: &str) -> Result<SamlAssertion, Box<dyn StdError + Send + Sync>> {
        Ok(serde_json::from_str(token)?)
    }
}

/// Treats an assertion as signed by the test key its signature names
#[derive(Debug)]
struct TestKeyVerifier;

impl SamlSignatureVerifier for TestKeyVerifier {
    fn verify_signature(&self, assertion: &SamlAssertion, key: &SigningKey) -> bool {
        let signer = match assertion.signature.as_ref().and_then(|s| s.key_id.as_deref()) {
            Some(kid) if kid == KEY_2025.kid => KEY_2025,
            Some(kid) if kid == KEY_2026.kid => KEY_2026,
            _ => return false,
        };
        key.same_material(&signer.signing_key())
    }
}

fn saml2() -> Saml2TokenHandler {
    Saml2TokenHandler::new(Arc::new(JsonReader), Arc::new(TestKeyVerifier))
}

fn signed_assertion(version: SamlVersion, signer: TestKey) -> SamlAssertion {
    let now = Utc::now();
    let mut assertion = SamlAssertion::new(version, format!("_{}", uuid::Uuid::new_v4()));
    assertion.issuer = Some(ISSUER.into());
    assertion.issue_instant = Some(now);
    assertion.subject = Some("alice@example.com".into());
    assertion.conditions = Some(SamlConditions {
        not_before: Some(now - Duration::minutes(1)),
        not_on_or_after: Some(now + Duration::hours(1)),
        audience_restrictions: vec![AudienceRestriction::new([AUDIENCE])],
        ..SamlConditions::default()
    });
    assertion.signature = Some(SamlSignatureInfo {
        algorithm: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".into(),
        key_id: Some(signer.kid.into()),
    });
    assertion
}

async fn validate(
    handler: &dyn TokenHandler,
    assertion: &SamlAssertion,
    parameters: &ValidationParameters,
) -> ValidationResult<ValidatedToken> {
    let token = serde_json::to_string(assertion).unwrap();
    handler
        .validate_token(&token, parameters, &CallContext::new(), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_saml2_with_static_configuration() {
    let configuration =
        OpenIdConnectConfiguration::new(ISSUER).with_signing_key(KEY_2025.signing_key());
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_configuration_manager(Arc::new(StaticConfigurationManager::new(configuration)));

    let validated = validate(
        &saml2(),
        &signed_assertion(SamlVersion::V2_0, KEY_2025),
        &parameters,
    )
    .await
    .unwrap();

    assert_eq!(validated.security_token().kind(), TokenKind::Saml2);
    assert_eq!(validated.issuer().issuer, ISSUER);
    assert_eq!(
        validated
            .claims_identity()
            .find_first(NAME_IDENTIFIER_CLAIM)
            .map(|claim| claim.value.as_str()),
        Some("alice@example.com")
    );
}

/// Test: an assertion signed with a rotated key validates after a refresh
#[tokio::test]
async fn test_saml2_key_rotation_recovery() {
    // GIVEN: a manager that cached the 2025 key
    let retriever = RotatingRetriever::new(&[KEY_2025]);
    let manager = ConfigurationManager::<OpenIdConnectConfiguration>::new(
        "https://login.example.com/.well-known/openid-configuration",
        retriever.clone(),
    )
    .unwrap();
    manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_configuration_manager(Arc::new(manager));

    // WHEN: the provider rotates and signs with the new key
    retriever.rotate(&[KEY_2026]);
    let validated = validate(
        &saml2(),
        &signed_assertion(SamlVersion::V2_0, KEY_2026),
        &parameters,
    )
    .await
    .unwrap();

    // THEN: the refreshed configuration supplied the key
    assert!(validated.configuration_refreshed());
    assert_eq!(
        validated.signing_key().and_then(SigningKey::key_id),
        Some(KEY_2026.kid)
    );
    assert_eq!(retriever.calls(), 2);
}

#[tokio::test]
async fn test_forged_saml_signature_is_not_recovered() {
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_valid_issuers([ISSUER])
        .with_issuer_signing_key(SigningKey::symmetric(b"not-the-idp".to_vec()).with_key_id(KEY_2025.kid));

    let error = validate(
        &saml2(),
        &signed_assertion(SamlVersion::V2_0, KEY_2025),
        &parameters,
    )
    .await
    .unwrap_err();
    assert_eq!(error.exception_type(), ExceptionType::InvalidSignature);
}

#[tokio::test]
async fn test_one_time_use_shared_cache() {
    let cache = Arc::new(InMemoryTokenReplayCache::new());
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_valid_issuers([ISSUER])
        .with_issuer_signing_key(KEY_2025.signing_key())
        .with_token_replay_cache(cache.clone());

    let mut assertion = signed_assertion(SamlVersion::V2_0, KEY_2025);
    if let Some(conditions) = assertion.conditions.as_mut() {
        conditions.one_time_use = true;
    }

    // Same cache, two handler instances
    validate(&saml2(), &assertion, &parameters).await.unwrap();
    let error = validate(&saml2(), &assertion, &parameters).await.unwrap_err();

    assert_eq!(error.exception_type(), ExceptionType::ReplayDetected);
    assert_eq!(cache.len(), 1);
}

/// Test: a one-time-use assertion recovered by a refresh is recorded once
#[tokio::test]
async fn test_one_time_use_survives_key_rotation_recovery() {
    let retriever = RotatingRetriever::new(&[KEY_2025]);
    let manager = ConfigurationManager::<OpenIdConnectConfiguration>::new(
        "https://login.example.com/.well-known/openid-configuration",
        retriever.clone(),
    )
    .unwrap();
    manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();
    let cache = Arc::new(InMemoryTokenReplayCache::new());
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_configuration_manager(Arc::new(manager))
        .with_token_replay_cache(cache.clone());

    retriever.rotate(&[KEY_2026]);
    let mut assertion = signed_assertion(SamlVersion::V2_0, KEY_2026);
    if let Some(conditions) = assertion.conditions.as_mut() {
        conditions.one_time_use = true;
    }

    let validated = validate(&saml2(), &assertion, &parameters).await.unwrap();
    assert!(validated.configuration_refreshed());
    assert_eq!(cache.len(), 1);

    let error = validate(&saml2(), &assertion, &parameters).await.unwrap_err();
    assert_eq!(error.exception_type(), ExceptionType::ReplayDetected);
}

/// Test: callers pick a handler by token kind
#[tokio::test]
async fn test_dispatch_by_token_kind() {
    let mut handlers: HashMap<TokenKind, Arc<dyn TokenHandler>> = HashMap::new();
    handlers.insert(TokenKind::Jwt, Arc::new(JsonWebTokenHandler::new()));
    handlers.insert(
        TokenKind::Saml,
        Arc::new(SamlTokenHandler::new(Arc::new(JsonReader), Arc::new(TestKeyVerifier))),
    );
    handlers.insert(TokenKind::Saml2, Arc::new(saml2()));

    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_valid_issuers([ISSUER])
        .with_issuer_signing_key(KEY_2025.signing_key());

    let saml11 = signed_assertion(SamlVersion::V1_1, KEY_2025);
    let validated = validate(handlers[&TokenKind::Saml].as_ref(), &saml11, &parameters)
        .await
        .unwrap();
    assert_eq!(validated.security_token().kind(), TokenKind::Saml);

    // A SAML 1.1 assertion handed to the SAML 2.0 handler is unreadable
    let error = validate(handlers[&TokenKind::Saml2].as_ref(), &saml11, &parameters)
        .await
        .unwrap_err();
    assert_eq!(error.exception_type(), ExceptionType::Malformed);
}
