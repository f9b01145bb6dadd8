//! OpenID Connect discovery configuration
//!
//! [`OpenIdConnectConfigurationRetriever`] downloads the discovery document
//! (`/.well-known/openid-configuration`), then the JWKS it points at, and
//! turns the JWKs into [`SigningKey`]s.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::{Host, Url};

use super::{Configuration, ConfigurationError, ConfigurationRetriever, ConfigurationValidator};
use crate::keys::SigningKey;

/// Default request timeout (10 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default response size limit (256 KB)
const DEFAULT_MAX_RESPONSE_SIZE: usize = 256 * 1024;

/// OpenID Connect provider metadata plus the signing keys from its JWKS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenIdConnectConfiguration {
    /// Issuer identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// UserInfo endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// End session endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// JWKS document location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported ID token signing algorithms
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Keys loaded from `jwks_uri`
    #[serde(skip)]
    pub signing_keys: Vec<SigningKey>,

    /// Members not modelled above
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl OpenIdConnectConfiguration {
    /// Configuration with only an issuer
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..Default::default()
        }
    }

    /// Parse a discovery document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidJson`] when `json` is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidJson(e.to_string()))
    }

    /// Add a signing key
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_keys.push(key);
        self
    }

    /// Add signing keys
    pub fn with_signing_keys(mut self, keys: impl IntoIterator<Item = SigningKey>) -> Self {
        self.signing_keys.extend(keys);
        self
    }
}

impl Configuration for OpenIdConnectConfiguration {
    fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    fn signing_keys(&self) -> &[SigningKey] {
        &self.signing_keys
    }
}

/// Fetches [`OpenIdConnectConfiguration`]s over HTTP
///
/// HTTPS is required unless the host is `localhost` or a loopback address.
/// Responses are limited in size and redirects are not followed.
#[derive(Debug, Clone)]
pub struct OpenIdConnectConfigurationRetriever {
    client: reqwest::Client,
    timeout: Duration,
    require_https: bool,
    max_response_size: usize,
}

impl Default for OpenIdConnectConfigurationRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenIdConnectConfigurationRetriever {
    /// Retriever with its own HTTP client
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    /// Retriever sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            require_https: true,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow plain HTTP for every host when `false`
    pub fn require_https(mut self, require_https: bool) -> Self {
        self.require_https = require_https;
        self
    }

    /// Largest accepted response body in bytes
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    fn check_address(&self, address: &str) -> Result<Url, ConfigurationError> {
        let url = Url::parse(address)
            .map_err(|e| ConfigurationError::InvalidAddress(format!("{address}: {e}")))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if !self.require_https || is_loopback(&url) => Ok(url),
            "http" => Err(ConfigurationError::InvalidAddress(format!(
                "{address}: HTTPS is required (HTTP only allowed for localhost)"
            ))),
            scheme => Err(ConfigurationError::InvalidAddress(format!(
                "{address}: unsupported scheme '{scheme}'"
            ))),
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ConfigurationError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ConfigurationError::HttpError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ConfigurationError::HttpError(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(content_length) = response.content_length()
            && content_length > self.max_response_size as u64
        {
            return Err(ConfigurationError::ResponseTooLarge);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConfigurationError::HttpError(format!("Failed to read response: {e}")))?;

        if body.len() > self.max_response_size {
            return Err(ConfigurationError::ResponseTooLarge);
        }

        serde_json::from_slice(&body)
            .map_err(|e| ConfigurationError::InvalidJson(format!("Failed to parse JSON: {e}")))
    }

    async fn retrieve(&self, address: &str) -> Result<OpenIdConnectConfiguration, ConfigurationError> {
        let url = self.check_address(address)?;
        debug!(metadata_address = %address, "Fetching OpenID Connect configuration");
        let mut configuration: OpenIdConnectConfiguration = self.fetch_json(url).await?;

        if let Some(jwks_uri) = configuration.jwks_uri.clone() {
            let url = self.check_address(&jwks_uri)?;
            debug!(jwks_uri = %jwks_uri, "Fetching JWKS");
            let jwks: JwkSet = self.fetch_json(url).await?;
            configuration.signing_keys = SigningKey::from_jwk_set(&jwks);
            debug!(
                jwks_uri = %jwks_uri,
                key_count = configuration.signing_keys.len(),
                "JWKS loaded"
            );
        }

        Ok(configuration)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[async_trait]
impl ConfigurationRetriever<OpenIdConnectConfiguration> for OpenIdConnectConfigurationRetriever {
    async fn get_configuration(
        &self,
        address: &str,
        cancellation: &CancellationToken,
    ) -> Result<OpenIdConnectConfiguration, ConfigurationError> {
        tokio::select! {
            result = self.retrieve(address) => result,
            () = cancellation.cancelled() => Err(ConfigurationError::Cancelled),
        }
    }
}

/// Rejects configurations with too few signing keys
#[derive(Debug, Clone, Copy)]
pub struct OpenIdConnectConfigurationValidator {
    minimum_number_of_keys: usize,
}

impl Default for OpenIdConnectConfigurationValidator {
    fn default() -> Self {
        Self {
            minimum_number_of_keys: 1,
        }
    }
}

impl OpenIdConnectConfigurationValidator {
    /// Validator requiring at least `minimum_number_of_keys` signing keys
    pub fn new(minimum_number_of_keys: usize) -> Self {
        Self {
            minimum_number_of_keys,
        }
    }

    /// Required number of signing keys
    pub fn minimum_number_of_keys(&self) -> usize {
        self.minimum_number_of_keys
    }
}

impl ConfigurationValidator<OpenIdConnectConfiguration> for OpenIdConnectConfigurationValidator {
    fn validate(&self, configuration: &OpenIdConnectConfiguration) -> Result<(), ConfigurationError> {
        let count = configuration.signing_keys.len();
        if count < self.minimum_number_of_keys {
            return Err(ConfigurationError::ValidationFailed(format!(
                "configuration has {count} signing keys, at least {} required",
                self.minimum_number_of_keys
            )));
        }
        Ok(())
    }
}
