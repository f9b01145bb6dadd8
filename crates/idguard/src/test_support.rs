//! Fixtures shared by unit tests

use chrono::{DateTime, Utc};

use crate::claims::Claim;
use crate::token::{SecurityToken, TokenKind};

/// Token with fixed, directly assignable properties
#[derive(Debug, Clone, Default)]
pub(crate) struct StubToken {
    pub id: Option<String>,
    pub issuer: Option<String>,
    pub audiences: Vec<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub key_id: Option<String>,
    pub algorithm: Option<String>,
    pub raw: String,
    pub claims: Vec<Claim>,
}

impl SecurityToken for StubToken {
    fn kind(&self) -> TokenKind {
        TokenKind::Jwt
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    fn audiences(&self) -> Vec<String> {
        self.audiences.clone()
    }

    fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn claims(&self) -> Vec<Claim> {
        self.claims.clone()
    }
}

/// Mint an HS256 JWS over `claims`
pub(crate) fn sign_hs256(secret: &[u8], kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(
        &header,
        claims,
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .expect("HS256 signing")
}
