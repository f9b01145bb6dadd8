//! Refresh and last-known-good recovery
//!
//! Tests cover:
//! - Signing key rotation picked up by an inline refresh
//! - Falling back to a last-known-good configuration after a rotation
//! - Choosing among several last-known-good configurations
//! - Issuer renames
//! - Failures that never trigger a refetch
//! - Replay caches surviving a recovery retry

mod common;

use std::sync::Arc;

use common::{
    AUDIENCE, ISSUER, KEY_2025, KEY_2026, KEY_2027, RotatingRetriever, mint, valid_claims,
};
use idguard::configuration::{
    BaseConfigurationManager, Configuration, ConfigurationManager, ConfigurationManagerOptions,
    OpenIdConnectConfiguration,
};
use idguard::replay_cache::InMemoryTokenReplayCache;
use idguard::jwt::JsonWebTokenHandler;
use idguard::validators::IssuerValidationSource;
use idguard::{CallContext, ExceptionType, TokenHandler, ValidationParameters};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const METADATA_ADDRESS: &str = "https://login.example.com/.well-known/openid-configuration";

struct Fixture {
    retriever: RotatingRetriever,
    manager: ConfigurationManager<OpenIdConnectConfiguration>,
    handler: JsonWebTokenHandler,
}

impl Fixture {
    fn new(keys: &[common::TestKey]) -> Self {
        Self::with_options(keys, ConfigurationManagerOptions::default())
    }

    fn with_options(keys: &[common::TestKey], options: ConfigurationManagerOptions) -> Self {
        let retriever = RotatingRetriever::new(keys);
        let manager = ConfigurationManager::builder(METADATA_ADDRESS, retriever.clone())
            .options(options)
            .build()
            .unwrap();
        Self {
            retriever,
            manager,
            handler: JsonWebTokenHandler::new(),
        }
    }

    fn parameters(&self) -> ValidationParameters {
        ValidationParameters::new()
            .with_valid_audiences([AUDIENCE])
            .with_configuration_manager(Arc::new(self.manager.clone()))
    }

    async fn validate(
        &self,
        token: &str,
        parameters: &ValidationParameters,
    ) -> idguard::ValidationResult<idguard::ValidatedToken> {
        self.handler
            .validate_token(token, parameters, &CallContext::new(), &CancellationToken::new())
            .await
    }
}

fn key_ids(configuration: &dyn Configuration) -> Vec<String> {
    configuration
        .signing_keys()
        .iter()
        .filter_map(|key| key.key_id().map(str::to_string))
        .collect()
}

fn configuration_key_ids(validated: &idguard::ValidatedToken) -> Vec<String> {
    validated
        .configuration()
        .map(|configuration| key_ids(configuration.as_ref()))
        .unwrap_or_default()
}

/// Test: a token signed with a freshly rotated key validates after one refresh
#[tokio::test]
async fn test_signing_key_rotation_recovered_by_refresh() {
    // GIVEN: the manager cached the 2025 key set
    let fixture = Fixture::new(&[KEY_2025]);
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();

    // WHEN: the provider rotates and a token signed with the new key arrives
    fixture.retriever.rotate(&[KEY_2026]);
    let token = mint(KEY_2026, &valid_claims());
    let validated = fixture.validate(&token, &fixture.parameters()).await.unwrap();

    // THEN: validated against the refreshed configuration
    assert!(validated.configuration_refreshed());
    assert_eq!(configuration_key_ids(&validated), vec!["key-2026"]);
    assert_eq!(validated.signing_key().and_then(|k| k.key_id()), Some("key-2026"));
    assert_eq!(fixture.retriever.calls(), 2);
}

/// Test: after a rotation, tokens signed with the retired key still validate
/// against the last-known-good configuration
#[tokio::test]
async fn test_last_known_good_rescues_retired_key() {
    // GIVEN: a token validated with the 2025 configuration, which becomes last-known-good
    let fixture = Fixture::new(&[KEY_2025]);
    let parameters = fixture.parameters();
    let old_token = mint(KEY_2025, &valid_claims());
    let first = fixture.validate(&old_token, &parameters).await.unwrap();
    assert!(!first.configuration_refreshed());

    // AND: the provider now publishes only the 2026 key and the manager picked it up
    fixture.retriever.rotate(&[KEY_2026]);
    fixture.manager.request_refresh();
    let current = fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(current.signing_keys[0].key_id(), Some("key-2026"));

    // WHEN: another token signed with the retired key arrives
    let validated = fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap();

    // THEN: the last-known-good configuration validated it without another fetch
    assert!(validated.configuration_refreshed());
    assert_eq!(configuration_key_ids(&validated), vec!["key-2025"]);
    assert_eq!(fixture.retriever.calls(), 2);
}

/// Test: with several last-known-good configurations, the ones without the
/// token's key are skipped and the one that validates is promoted
#[tokio::test]
async fn test_last_known_good_candidate_is_chosen_and_promoted() {
    // GIVEN: the 2025 and then the 2026 configuration validated tokens
    let fixture = Fixture::new(&[KEY_2025]);
    let parameters = fixture.parameters();
    fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap();
    fixture.manager.update_configuration(
        OpenIdConnectConfiguration::new(ISSUER).with_signing_key(KEY_2026.signing_key()),
    );
    fixture
        .validate(&mint(KEY_2026, &valid_claims()), &parameters)
        .await
        .unwrap();
    let history: Vec<_> = fixture
        .manager
        .last_known_good_configurations()
        .iter()
        .map(|configuration| key_ids(configuration.as_ref()))
        .collect();
    assert_eq!(history, vec![vec!["key-2026"], vec!["key-2025"]]);

    // AND: the provider moved on to a 2027 key set that the manager picked up
    fixture.retriever.rotate(&[KEY_2027]);
    fixture.manager.request_refresh();
    let current = fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(key_ids(current.as_ref()), vec!["key-2027"]);

    // WHEN: a token signed with the 2025 key arrives
    let validated = fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap();

    // THEN: the 2026 configuration was passed over and the 2025 one validated it
    assert!(validated.configuration_refreshed());
    assert_eq!(configuration_key_ids(&validated), vec!["key-2025"]);
    assert_eq!(fixture.retriever.calls(), 2);

    // AND: the 2025 configuration is the last-known-good head again
    let head = fixture.manager.last_known_good_configuration().unwrap();
    assert_eq!(key_ids(head.as_ref()), vec!["key-2025"]);
    let history: Vec<_> = fixture
        .manager
        .last_known_good_configurations()
        .iter()
        .map(|configuration| key_ids(configuration.as_ref()))
        .collect();
    assert_eq!(history, vec![vec!["key-2025"], vec!["key-2026"]]);
}

#[tokio::test]
async fn test_last_known_good_disabled() {
    let options = ConfigurationManagerOptions {
        use_last_known_good_configuration: false,
        ..Default::default()
    };
    let fixture = Fixture::with_options(&[KEY_2025], options);
    let parameters = fixture.parameters();
    fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap();

    fixture.retriever.rotate(&[KEY_2026]);
    fixture.manager.request_refresh();
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();

    let error = fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap_err();
    assert!(matches!(
        error.exception_type(),
        ExceptionType::SignatureKeyNotFound | ExceptionType::InvalidSignature
    ));
}

/// Test: an issuer rename is picked up by a refresh
#[tokio::test]
async fn test_issuer_rename_recovered_by_refresh() {
    let fixture = Fixture::new(&[KEY_2025]);
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();

    let renamed = format!("{ISSUER}/v2.0");
    fixture.retriever.rename_issuer(&renamed);

    let mut claims = valid_claims();
    claims["iss"] = json!(&renamed);
    let validated = fixture
        .validate(&mint(KEY_2025, &claims), &fixture.parameters())
        .await
        .unwrap();

    assert!(validated.configuration_refreshed());
    assert_eq!(validated.issuer().issuer, renamed);
    assert_eq!(
        validated.issuer().source,
        IssuerValidationSource::IssuerMatchedConfiguration
    );
}

/// Test: failures unrelated to the configuration never refetch
#[tokio::test]
async fn test_non_recoverable_failure_does_not_refetch() {
    let fixture = Fixture::new(&[KEY_2025]);

    let mut claims = valid_claims();
    claims["aud"] = json!("api://someone-else");
    let error = fixture
        .validate(&mint(KEY_2025, &claims), &fixture.parameters())
        .await
        .unwrap_err();

    assert_eq!(error.exception_type(), ExceptionType::InvalidAudience);
    assert_eq!(fixture.retriever.calls(), 1);
}

#[tokio::test]
async fn test_refresh_before_validation() {
    let fixture = Fixture::new(&[KEY_2025]);
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();

    let mut parameters = fixture.parameters();
    parameters.refresh_before_validation = true;
    fixture
        .validate(&mint(KEY_2025, &valid_claims()), &parameters)
        .await
        .unwrap();

    assert_eq!(fixture.retriever.calls(), 2);
}

/// Test: a replay cache records the token once even when recovery re-runs the checks
#[tokio::test]
async fn test_replay_cache_survives_refresh_retry() {
    // GIVEN: a replay cache and a manager that cached the 2025 key set
    let fixture = Fixture::new(&[KEY_2025]);
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();
    let cache = Arc::new(InMemoryTokenReplayCache::new());
    let parameters = fixture.parameters().with_token_replay_cache(cache.clone());

    // WHEN: the provider rotates and a token signed with the new key arrives
    fixture.retriever.rotate(&[KEY_2026]);
    let token = mint(KEY_2026, &valid_claims());
    let validated = fixture.validate(&token, &parameters).await.unwrap();

    // THEN: the retry against the refreshed configuration did not see its own entry
    assert!(validated.configuration_refreshed());
    assert!(validated.token_replay_expiration().is_some());
    assert_eq!(fixture.retriever.calls(), 2);
    assert_eq!(cache.len(), 1);

    // AND: presenting the token again is still a replay
    let error = fixture.validate(&token, &parameters).await.unwrap_err();
    assert_eq!(error.exception_type(), ExceptionType::ReplayDetected);
}

#[tokio::test]
async fn test_replay_cache_survives_last_known_good_retry() {
    let fixture = Fixture::new(&[KEY_2025]);
    let cache = Arc::new(InMemoryTokenReplayCache::new());
    let parameters = fixture.parameters().with_token_replay_cache(cache.clone());
    let mut claims = valid_claims();
    claims["jti"] = json!("first");
    fixture
        .validate(&mint(KEY_2025, &claims), &parameters)
        .await
        .unwrap();

    fixture.retriever.rotate(&[KEY_2026]);
    fixture.manager.request_refresh();
    fixture
        .manager
        .get_configuration(&CancellationToken::new())
        .await
        .unwrap();

    claims["jti"] = json!("second");
    let validated = fixture
        .validate(&mint(KEY_2025, &claims), &parameters)
        .await
        .unwrap();
    assert_eq!(configuration_key_ids(&validated), vec!["key-2025"]);
    assert_eq!(cache.len(), 2);
}
