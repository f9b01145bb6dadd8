//! Common test utilities for integration tests
//!
//! Provides a mock identity provider (discovery document + JWKS over
//! wiremock), an in-process retriever whose keys can be rotated, and helpers
//! to mint HS256 tokens.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use idguard::configuration::{
    ConfigurationError, ConfigurationRetriever, OpenIdConnectConfiguration,
};
use idguard::keys::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ISSUER: &str = "https://login.example.com";
pub const AUDIENCE: &str = "api://orders";

/// A named HMAC key
#[derive(Debug, Clone, Copy)]
pub struct TestKey {
    pub kid: &'static str,
    pub secret: &'static [u8],
}

pub const KEY_2025: TestKey = TestKey {
    kid: "key-2025",
    secret: b"first-signing-secret-used-by-the-idp",
};

pub const KEY_2026: TestKey = TestKey {
    kid: "key-2026",
    secret: b"second-signing-secret-after-rotation",
};

pub const KEY_2027: TestKey = TestKey {
    kid: "key-2027",
    secret: b"third-signing-secret-after-another-rotation",
};

impl TestKey {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::symmetric(self.secret).with_key_id(self.kid)
    }

    /// The key as an `oct` JWK
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "oct",
            "kid": self.kid,
            "alg": "HS256",
            "use": "sig",
            "k": URL_SAFE_NO_PAD.encode(self.secret),
        })
    }
}

/// Claims of a token valid for the next hour
pub fn valid_claims() -> Value {
    let now = Utc::now();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "alice",
        "name": "Alice",
        "role": ["reader"],
        "iat": now.timestamp(),
        "nbf": (now - Duration::minutes(1)).timestamp(),
        "exp": (now + Duration::hours(1)).timestamp(),
    })
}

/// HS256 token over `claims` signed with `key`
pub fn mint(key: TestKey, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(key.kid.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(key.secret))
        .expect("HS256 signing")
}

/// Mock OpenID Connect provider
pub struct MockIdentityProvider {
    pub server: MockServer,
    pub metadata_address: String,
    pub jwks_uri: String,
}

impl MockIdentityProvider {
    /// Start a provider with nothing mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();

        Self {
            metadata_address: format!("{}/.well-known/openid-configuration", base_url),
            jwks_uri: format!("{}/keys", base_url),
            server,
        }
    }

    /// Serve the discovery document and a JWKS with `keys`
    pub async fn publish(&self, keys: &[TestKey]) {
        self.mount_discovery().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": keys.iter().map(TestKey::jwk).collect::<Vec<_>>(),
            })))
            .mount(&self.server)
            .await;
    }

    /// Serve the discovery document only
    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": ISSUER,
                "jwks_uri": self.jwks_uri,
                "id_token_signing_alg_values_supported": ["HS256"],
            })))
            .mount(&self.server)
            .await;
    }

    /// Drop every mock and publish `keys` instead
    pub async fn rotate(&self, keys: &[TestKey]) {
        self.server.reset().await;
        self.publish(keys).await;
    }

    /// Answer every request with `status`
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of discovery document requests received
    pub async fn discovery_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/.well-known/openid-configuration")
            .count()
    }
}

/// In-process retriever with rotatable keys and a call counter
#[derive(Debug, Clone)]
pub struct RotatingRetriever {
    state: Arc<Mutex<(String, Vec<TestKey>)>>,
    calls: Arc<AtomicUsize>,
}

impl RotatingRetriever {
    pub fn new(keys: &[TestKey]) -> Self {
        Self {
            state: Arc::new(Mutex::new((ISSUER.to_string(), keys.to_vec()))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rotate(&self, keys: &[TestKey]) {
        self.state.lock().1 = keys.to_vec();
    }

    pub fn rename_issuer(&self, issuer: &str) {
        self.state.lock().0 = issuer.to_string();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigurationRetriever<OpenIdConnectConfiguration> for RotatingRetriever {
    async fn get_configuration(
        &self,
        _address: &str,
        _cancellation: &CancellationToken,
    ) -> Result<OpenIdConnectConfiguration, ConfigurationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (issuer, keys) = self.state.lock().clone();
        Ok(OpenIdConnectConfiguration::new(issuer)
            .with_signing_keys(keys.iter().map(TestKey::signing_key)))
    }
}
