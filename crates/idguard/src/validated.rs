//! The result of a successful validation

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::claims::ClaimsIdentity;
use crate::configuration::Configuration;
use crate::keys::SigningKey;
use crate::parameters::ValidationParameters;
use crate::token::{SecurityToken, TokenHandler};
use crate::validators::{
    ValidatedIssuer, ValidatedLifetime, ValidatedSigningKeyLifetime, ValidatedTokenType,
};

/// A token that passed every check, with what each check accepted
///
/// The claims identity is built by the handler on first access and cached.
#[derive(Clone)]
pub struct ValidatedToken {
    pub(crate) security_token: Arc<dyn SecurityToken>,
    pub(crate) handler: Arc<dyn TokenHandler>,
    pub(crate) parameters: ValidationParameters,
    pub(crate) audience: Option<String>,
    pub(crate) issuer: ValidatedIssuer,
    pub(crate) lifetime: Option<ValidatedLifetime>,
    pub(crate) token_replay_expiration: Option<DateTime<Utc>>,
    pub(crate) token_type: Option<ValidatedTokenType>,
    pub(crate) signing_key: Option<SigningKey>,
    pub(crate) signing_key_lifetime: Option<ValidatedSigningKeyLifetime>,
    pub(crate) actor: Option<Box<ValidatedToken>>,
    pub(crate) configuration: Option<Arc<dyn Configuration>>,
    pub(crate) configuration_refreshed: bool,
    claims_identity: OnceLock<ClaimsIdentity>,
    claims: OnceLock<HashMap<String, Value>>,
}

impl ValidatedToken {
    pub(crate) fn new(
        security_token: Arc<dyn SecurityToken>,
        handler: Arc<dyn TokenHandler>,
        parameters: ValidationParameters,
        issuer: ValidatedIssuer,
    ) -> Self {
        Self {
            security_token,
            handler,
            parameters,
            audience: None,
            issuer,
            lifetime: None,
            token_replay_expiration: None,
            token_type: None,
            signing_key: None,
            signing_key_lifetime: None,
            actor: None,
            configuration: None,
            configuration_refreshed: false,
            claims_identity: OnceLock::new(),
            claims: OnceLock::new(),
        }
    }

    /// The validated token; for an encrypted JWT, the outer token carrying the decrypted one
    pub fn security_token(&self) -> &Arc<dyn SecurityToken> {
        &self.security_token
    }

    /// Handler that validated the token
    pub fn token_handler(&self) -> &Arc<dyn TokenHandler> {
        &self.handler
    }

    /// Parameters the token was validated with
    pub fn validation_parameters(&self) -> &ValidationParameters {
        &self.parameters
    }

    /// Matched audience
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Accepted issuer and what it matched
    pub fn issuer(&self) -> &ValidatedIssuer {
        &self.issuer
    }

    /// Accepted validity window
    pub fn lifetime(&self) -> Option<&ValidatedLifetime> {
        self.lifetime.as_ref()
    }

    /// Expiration recorded by the replay check
    pub fn token_replay_expiration(&self) -> Option<DateTime<Utc>> {
        self.token_replay_expiration
    }

    /// Accepted token type
    pub fn token_type(&self) -> Option<&ValidatedTokenType> {
        self.token_type.as_ref()
    }

    /// Key that verified the signature
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    /// Validity window of the signing key
    pub fn signing_key_lifetime(&self) -> Option<&ValidatedSigningKeyLifetime> {
        self.signing_key_lifetime.as_ref()
    }

    /// Validated actor token
    pub fn actor(&self) -> Option<&ValidatedToken> {
        self.actor.as_deref()
    }

    /// Configuration the token was validated against
    pub fn configuration(&self) -> Option<&Arc<dyn Configuration>> {
        self.configuration.as_ref()
    }

    /// Whether the configuration was refreshed before the successful attempt
    pub fn configuration_refreshed(&self) -> bool {
        self.configuration_refreshed
    }

    /// Claims identity, created by the handler on first access
    pub fn claims_identity(&self) -> &ClaimsIdentity {
        self.claims_identity
            .get_or_init(|| self.handler.create_claims_identity(self))
    }

    /// Replace the claims identity; the cached claims map is rebuilt on next access
    pub fn set_claims_identity(&mut self, identity: ClaimsIdentity) {
        self.claims_identity = OnceLock::from(identity);
        self.claims = OnceLock::new();
    }

    /// Claims of the identity keyed by type
    pub fn claims(&self) -> &HashMap<String, Value> {
        self.claims
            .get_or_init(|| self.claims_identity().to_claims_map())
    }
}

impl fmt::Debug for ValidatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedToken")
            .field("kind", &self.handler.kind())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .field("token_type", &self.token_type)
            .field("signing_key_id", &self.signing_key.as_ref().and_then(SigningKey::key_id))
            .field("actor", &self.actor)
            .field("configuration_refreshed", &self.configuration_refreshed)
            .finish_non_exhaustive()
    }
}
