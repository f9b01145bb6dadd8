//! SAML 1.1 and SAML 2.0 assertions
//!
//! XML handling stays outside this crate: a [`SamlTokenReader`] turns the
//! serialized assertion into a [`SamlAssertion`] and a
//! [`SamlSignatureVerifier`] checks its enveloped signature against a
//! candidate key. The handlers run the checks in this order:
//!
//! ```text
//! lifetime → audience restrictions → one-time use → proxy restriction
//!          → issuer → signature → issuer signing key
//! ```
//!
//! with the same refresh and last-known-good recovery as JWTs.

mod assertion;
mod handler;

pub use assertion::{
    AudienceRestriction, NAME_IDENTIFIER_CLAIM, ProxyRestriction, SamlAssertion, SamlAttribute,
    SamlConditions, SamlSignatureInfo, SamlVersion,
};
pub use handler::{ProxyRestrictionValidator, Saml2TokenHandler, SamlTokenHandler};

use std::error::Error as StdError;
use std::fmt::Debug;

use crate::keys::SigningKey;

/// Reads serialized SAML assertions
pub trait SamlTokenReader: Send + Sync + Debug {
    /// Parse `token` into an assertion; `raw` may be left empty
    ///
    /// # Errors
    ///
    /// Any error; it becomes the inner error of a `TokenReadingFailed` failure.
    fn read_assertion(&self, token: &str) -> Result<SamlAssertion, Box<dyn StdError + Send + Sync>>;
}

/// Checks the enveloped signature of an assertion
pub trait SamlSignatureVerifier: Send + Sync + Debug {
    /// Whether the assertion's signature verifies with `key`
    fn verify_signature(&self, assertion: &SamlAssertion, key: &SigningKey) -> bool;
}
