//! Validation parameters

use std::fmt;
use std::sync::Arc;

use chrono::Duration;

use crate::configuration::BaseConfigurationManager;
use crate::keys::SigningKey;
use crate::replay_cache::TokenReplayCache;
use crate::time::{TimeProvider, system_clock};
use crate::validators::Validators;

/// Default clock skew (5 minutes)
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::minutes(5);

/// Default maximum token size (250 KiB)
pub const DEFAULT_MAXIMUM_TOKEN_SIZE_IN_BYTES: usize = 250 * 1024;

/// Default authentication type of created identities
pub const DEFAULT_AUTHENTICATION_TYPE: &str = "AuthenticationTypes.Federation";

/// Default name claim type
pub const DEFAULT_NAME_CLAIM_TYPE: &str = "name";

/// Default role claim type
pub const DEFAULT_ROLE_CLAIM_TYPE: &str = "role";

/// What to accept and how to validate it
///
/// Cheap to clone; collaborators are shared behind `Arc`.
///
/// # Example
///
/// ```rust
/// use chrono::Duration;
/// use idguard::ValidationParameters;
///
/// let params = ValidationParameters::new()
///     .with_valid_audiences(["https://api.example.com"])
///     .with_valid_issuers(["https://login.example.com"])
///     .with_clock_skew(Duration::seconds(60));
///
/// assert!(params.ignore_trailing_slash_when_validating_audience);
/// assert_eq!(params.maximum_token_size_in_bytes, 250 * 1024);
/// ```
#[derive(Clone)]
pub struct ValidationParameters {
    /// Accepted audiences
    pub valid_audiences: Vec<String>,
    /// Accepted issuers, consulted after the configuration's issuer
    pub valid_issuers: Vec<String>,
    /// Accepted signature algorithms; empty accepts any
    pub valid_algorithms: Vec<String>,
    /// Accepted token types (`typ`); empty accepts any
    pub valid_types: Vec<String>,
    /// Signing keys in addition to the configuration's keys
    pub issuer_signing_keys: Vec<SigningKey>,
    /// Tolerance applied to every time comparison, in both directions
    pub clock_skew: Duration,
    /// Tokens longer than this are rejected before parsing
    pub maximum_token_size_in_bytes: usize,
    /// Treat `https://a` and `https://a/` as the same audience
    pub ignore_trailing_slash_when_validating_audience: bool,
    /// Try every known key when the `kid` matches none
    pub try_all_issuer_signing_keys: bool,
    /// Validate the `actort` claim as a nested token
    pub validate_actor: bool,
    /// Parameters for the actor token; `None` reuses these
    pub actor_validation_parameters: Option<Arc<ValidationParameters>>,
    /// Ask the configuration manager for a refresh before validating
    pub refresh_before_validation: bool,
    /// Replay cache; `None` disables replay detection
    pub token_replay_cache: Option<Arc<dyn TokenReplayCache>>,
    /// Source of issuer metadata and signing keys
    pub configuration_manager: Option<Arc<dyn BaseConfigurationManager>>,
    /// Authentication type of created identities
    pub authentication_type: String,
    /// Claim type used as the identity name
    pub name_claim_type: String,
    /// Claim type used for roles
    pub role_claim_type: String,
    /// Clock used by every time comparison
    pub time_provider: Arc<dyn TimeProvider>,
    /// Per-check overrides
    pub validators: Validators,
}

impl ValidationParameters {
    /// Parameters with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accepted audiences
    pub fn with_valid_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted issuers
    pub fn with_valid_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted algorithms
    pub fn with_valid_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted token types
    pub fn with_valid_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Add a signing key
    pub fn with_issuer_signing_key(mut self, key: SigningKey) -> Self {
        self.issuer_signing_keys.push(key);
        self
    }

    /// Set the clock skew
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Set the maximum token size
    pub fn with_maximum_token_size(mut self, bytes: usize) -> Self {
        self.maximum_token_size_in_bytes = bytes;
        self
    }

    /// Attach a replay cache
    pub fn with_token_replay_cache(mut self, cache: Arc<dyn TokenReplayCache>) -> Self {
        self.token_replay_cache = Some(cache);
        self
    }

    /// Attach a configuration manager
    pub fn with_configuration_manager(mut self, manager: Arc<dyn BaseConfigurationManager>) -> Self {
        self.configuration_manager = Some(manager);
        self
    }

    /// Use a different clock
    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Replace the validator overrides
    pub fn with_validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }

    /// Parameters applied to an actor token
    pub(crate) fn actor_parameters(&self) -> &ValidationParameters {
        self.actor_validation_parameters.as_deref().unwrap_or(self)
    }
}

impl Default for ValidationParameters {
    fn default() -> Self {
        Self {
            valid_audiences: Vec::new(),
            valid_issuers: Vec::new(),
            valid_algorithms: Vec::new(),
            valid_types: Vec::new(),
            issuer_signing_keys: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            maximum_token_size_in_bytes: DEFAULT_MAXIMUM_TOKEN_SIZE_IN_BYTES,
            ignore_trailing_slash_when_validating_audience: true,
            try_all_issuer_signing_keys: false,
            validate_actor: false,
            actor_validation_parameters: None,
            refresh_before_validation: false,
            token_replay_cache: None,
            configuration_manager: None,
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            name_claim_type: DEFAULT_NAME_CLAIM_TYPE.to_string(),
            role_claim_type: DEFAULT_ROLE_CLAIM_TYPE.to_string(),
            time_provider: system_clock(),
            validators: Validators::default(),
        }
    }
}

impl fmt::Debug for ValidationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationParameters")
            .field("valid_audiences", &self.valid_audiences)
            .field("valid_issuers", &self.valid_issuers)
            .field("valid_algorithms", &self.valid_algorithms)
            .field("valid_types", &self.valid_types)
            .field("issuer_signing_keys", &self.issuer_signing_keys.len())
            .field("clock_skew", &self.clock_skew)
            .field("maximum_token_size_in_bytes", &self.maximum_token_size_in_bytes)
            .field(
                "ignore_trailing_slash_when_validating_audience",
                &self.ignore_trailing_slash_when_validating_audience,
            )
            .field("try_all_issuer_signing_keys", &self.try_all_issuer_signing_keys)
            .field("validate_actor", &self.validate_actor)
            .field("refresh_before_validation", &self.refresh_before_validation)
            .field("token_replay_cache", &self.token_replay_cache.is_some())
            .field("configuration_manager", &self.configuration_manager.is_some())
            .field("authentication_type", &self.authentication_type)
            .field("validators", &self.validators)
            .finish_non_exhaustive()
    }
}
