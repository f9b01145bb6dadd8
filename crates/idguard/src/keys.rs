//! Signing keys used to verify token signatures

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use secrecy::{ExposeSecret, SecretVec};

/// Key material backing a [`SigningKey`]
#[derive(Clone)]
pub enum KeyMaterial {
    /// Public (or symmetric `oct`) key published as a JWK
    Jwk(Box<Jwk>),
    /// Shared secret for HMAC algorithms
    Symmetric(Arc<SecretVec<u8>>),
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jwk(jwk) => f.debug_tuple("Jwk").field(jwk).finish(),
            Self::Symmetric(_) => f.debug_tuple("Symmetric").field(&"[REDACTED]").finish(),
        }
    }
}

/// A key an issuer signs tokens with
///
/// The optional validity window is checked by the issuer signing key validator;
/// keys without a window are always considered valid.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: Option<String>,
    material: KeyMaterial,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Key from a JWK; the `kid` of the JWK becomes the key id
    pub fn from_jwk(jwk: Jwk) -> Self {
        Self {
            key_id: jwk.common.key_id.clone(),
            material: KeyMaterial::Jwk(Box::new(jwk)),
            not_before: None,
            not_after: None,
        }
    }

    /// All keys of a JWK set, in document order
    pub fn from_jwk_set(set: &JwkSet) -> Vec<Self> {
        set.keys.iter().cloned().map(Self::from_jwk).collect()
    }

    /// HMAC key from raw secret bytes
    pub fn symmetric(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: None,
            material: KeyMaterial::Symmetric(Arc::new(SecretVec::new(secret.into()))),
            not_before: None,
            not_after: None,
        }
    }

    /// Set the key id
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set the validity window
    pub fn with_validity(
        mut self,
        not_before: Option<DateTime<Utc>>,
        not_after: Option<DateTime<Utc>>,
    ) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Key id (`kid`)
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Key material
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Start of the validity window
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// End of the validity window
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Convert to a `jsonwebtoken` decoding key
    ///
    /// # Errors
    ///
    /// Returns an error when the JWK parameters cannot be turned into a key.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        match &self.material {
            KeyMaterial::Jwk(jwk) => DecodingKey::from_jwk(jwk),
            KeyMaterial::Symmetric(secret) => Ok(DecodingKey::from_secret(secret.expose_secret())),
        }
    }

    /// Whether both keys carry the same key material (ids and windows ignored)
    pub fn same_material(&self, other: &SigningKey) -> bool {
        match (&self.material, &other.material) {
            (KeyMaterial::Jwk(a), KeyMaterial::Jwk(b)) => a.algorithm == b.algorithm,
            (KeyMaterial::Symmetric(a), KeyMaterial::Symmetric(b)) => {
                a.expose_secret() == b.expose_secret()
            }
            _ => false,
        }
    }
}

/// Whether two key lists contain the same keys (same ids and material, any order)
pub(crate) fn same_key_set(left: &[SigningKey], right: &[SigningKey]) -> bool {
    left.len() == right.len()
        && left.iter().all(|key| {
            right
                .iter()
                .any(|other| key.key_id() == other.key_id() && key.same_material(other))
        })
}
