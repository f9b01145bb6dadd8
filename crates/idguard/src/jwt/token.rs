use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::claims::Claim;
use crate::token::{SecurityToken, TokenKind};

/// Claim carrying a nested actor token
pub const ACTOR_CLAIM: &str = "actort";

/// Why a JWT could not be read
#[derive(Debug, Error)]
pub enum TokenReadError {
    /// Neither three (JWS) nor five (JWE) segments
    #[error("JWT must have 3 (JWS) or 5 (JWE) segments, found {0}")]
    SegmentCount(usize),

    /// A segment is not base64url
    #[error("JWT {segment} is not valid base64url: {source}")]
    Base64 {
        /// Which segment
        segment: &'static str,
        /// Decoder error
        source: base64::DecodeError,
    },

    /// A segment is not JSON
    #[error("JWT {segment} is not valid JSON: {source}")]
    Json {
        /// Which segment
        segment: &'static str,
        /// Parser error
        source: serde_json::Error,
    },

    /// A segment is JSON but not an object
    #[error("JWT {0} is not a JSON object")]
    NotAnObject(&'static str),
}

#[derive(Debug, Clone)]
enum Serialization {
    Jws {
        encoded_payload: String,
        signature: String,
    },
    Jwe {
        encrypted_key: String,
        initialization_vector: String,
        ciphertext: String,
        authentication_tag: String,
    },
}

/// A JWT in compact serialization
///
/// Both JWS (`header.payload.signature`) and JWE
/// (`header.key.iv.ciphertext.tag`) are read. A JWE has no readable payload
/// until it is decrypted; after decryption the outer token carries the
/// decrypted token and delegates its claims to it.
///
/// ```rust
/// use idguard::jwt::JsonWebToken;
/// use idguard::token::SecurityToken;
///
/// // {"alg":"HS256","typ":"JWT"} . {"iss":"https://issuer","aud":["a","b"]}
/// let jwt = JsonWebToken::parse(
///     "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
///      eyJpc3MiOiJodHRwczovL2lzc3VlciIsImF1ZCI6WyJhIiwiYiJdfQ.c2ln",
/// )
/// .unwrap();
///
/// assert_eq!(jwt.algorithm(), Some("HS256"));
/// assert_eq!(SecurityToken::issuer(&jwt), Some("https://issuer"));
/// assert_eq!(jwt.audiences(), ["a", "b"]);
/// ```
#[derive(Debug, Clone)]
pub struct JsonWebToken {
    raw: String,
    encoded_header: String,
    header: Map<String, Value>,
    payload: Map<String, Value>,
    serialization: Serialization,
    inner: Option<Arc<JsonWebToken>>,
}

impl JsonWebToken {
    /// Read a compact JWT
    ///
    /// # Errors
    ///
    /// Returns [`TokenReadError`] for a wrong segment count or a header or
    /// payload that is not a base64url JSON object.
    pub fn parse(raw: &str) -> Result<Self, TokenReadError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if !matches!(segments.len(), 3 | 5) {
            return Err(TokenReadError::SegmentCount(segments.len()));
        }
        let header = decode_object(segments[0], "header")?;

        let (payload, serialization) = match segments.as_slice() {
            [_, payload, signature] => (
                decode_object(payload, "payload")?,
                Serialization::Jws {
                    encoded_payload: (*payload).to_string(),
                    signature: (*signature).to_string(),
                },
            ),
            [_, key, iv, ciphertext, tag] => (
                Map::new(),
                Serialization::Jwe {
                    encrypted_key: (*key).to_string(),
                    initialization_vector: (*iv).to_string(),
                    ciphertext: (*ciphertext).to_string(),
                    authentication_tag: (*tag).to_string(),
                },
            ),
            _ => return Err(TokenReadError::SegmentCount(segments.len())),
        };

        Ok(Self {
            raw: raw.to_string(),
            encoded_header: segments[0].to_string(),
            header,
            payload,
            serialization,
            inner: None,
        })
    }

    /// Whether this is a JWE
    pub fn is_encrypted(&self) -> bool {
        matches!(self.serialization, Serialization::Jwe { .. })
    }

    /// Decoded header
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// Decoded payload; empty for a JWE
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Header member as a string
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    /// Payload member of this token or, after decryption, of the inner token
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims_source().payload.get(name)
    }

    /// Content encryption algorithm (`enc`) of a JWE
    pub fn encryption_algorithm(&self) -> Option<&str> {
        self.header_value("enc")
    }

    /// Content type (`cty`)
    pub fn content_type(&self) -> Option<&str> {
        self.header_value("cty")
    }

    /// Header segment as received
    pub fn encoded_header(&self) -> &str {
        &self.encoded_header
    }

    /// `header.payload`, the bytes a JWS signature covers
    pub fn signing_input(&self) -> Option<String> {
        match &self.serialization {
            Serialization::Jws {
                encoded_payload, ..
            } => Some(format!("{}.{}", self.encoded_header, encoded_payload)),
            Serialization::Jwe { .. } => None,
        }
    }

    /// Signature segment of a JWS
    pub fn signature(&self) -> Option<&str> {
        match &self.serialization {
            Serialization::Jws { signature, .. } => Some(signature),
            Serialization::Jwe { .. } => None,
        }
    }

    /// Encrypted key segment of a JWE
    pub fn encrypted_key(&self) -> Option<&str> {
        self.jwe_segment(|encrypted_key, _, _, _| encrypted_key)
    }

    /// Initialization vector segment of a JWE
    pub fn initialization_vector(&self) -> Option<&str> {
        self.jwe_segment(|_, iv, _, _| iv)
    }

    /// Ciphertext segment of a JWE
    pub fn ciphertext(&self) -> Option<&str> {
        self.jwe_segment(|_, _, ciphertext, _| ciphertext)
    }

    /// Authentication tag segment of a JWE
    pub fn authentication_tag(&self) -> Option<&str> {
        self.jwe_segment(|_, _, _, tag| tag)
    }

    fn jwe_segment<'a>(
        &'a self,
        select: impl FnOnce(&'a str, &'a str, &'a str, &'a str) -> &'a str,
    ) -> Option<&'a str> {
        match &self.serialization {
            Serialization::Jwe {
                encrypted_key,
                initialization_vector,
                ciphertext,
                authentication_tag,
            } => Some(select(
                encrypted_key,
                initialization_vector,
                ciphertext,
                authentication_tag,
            )),
            Serialization::Jws { .. } => None,
        }
    }

    /// Decrypted token carried by a JWE
    pub fn inner_token(&self) -> Option<&Arc<JsonWebToken>> {
        self.inner.as_ref()
    }

    /// Attach the decrypted token
    pub fn with_inner_token(mut self, inner: Arc<JsonWebToken>) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Actor token text from the `actort` claim
    pub fn actor_token(&self) -> Option<&str> {
        self.claim(ACTOR_CLAIM).and_then(Value::as_str)
    }

    /// Issued-at time (`iat`)
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.claim("iat").and_then(numeric_date)
    }

    /// Subject (`sub`)
    pub fn subject(&self) -> Option<&str> {
        self.claim("sub").and_then(Value::as_str)
    }

    fn claims_source(&self) -> &JsonWebToken {
        self.inner.as_deref().unwrap_or(self)
    }
}

fn decode_object(segment: &str, name: &'static str) -> Result<Map<String, Value>, TokenReadError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|source| TokenReadError::Base64 {
            segment: name,
            source,
        })?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenReadError::NotAnObject(name)),
        Err(source) => Err(TokenReadError::Json {
            segment: name,
            source,
        }),
    }
}

/// Seconds since the epoch, integral or fractional
fn numeric_date(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(seconds) = value.as_i64() {
        return DateTime::from_timestamp(seconds, 0);
    }
    value
        .as_f64()
        .filter(|seconds| seconds.is_finite())
        .and_then(|seconds| DateTime::from_timestamp(seconds.trunc() as i64, 0))
}

fn claim_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl SecurityToken for JsonWebToken {
    fn kind(&self) -> TokenKind {
        TokenKind::Jwt
    }

    fn id(&self) -> Option<&str> {
        self.claim("jti").and_then(Value::as_str)
    }

    fn issuer(&self) -> Option<&str> {
        self.claim("iss").and_then(Value::as_str)
    }

    fn audiences(&self) -> Vec<String> {
        match self.claim("aud") {
            Some(Value::String(audience)) => vec![audience.clone()],
            Some(Value::Array(audiences)) => audiences
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn not_before(&self) -> Option<DateTime<Utc>> {
        self.claim("nbf").and_then(numeric_date)
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.claim("exp").and_then(numeric_date)
    }

    fn token_type(&self) -> Option<&str> {
        self.claims_source().header_value("typ")
    }

    fn key_id(&self) -> Option<&str> {
        self.claims_source().header_value("kid")
    }

    fn algorithm(&self) -> Option<&str> {
        self.claims_source().header_value("alg")
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    /// One claim per payload member; array members yield one claim per element
    fn claims(&self) -> Vec<Claim> {
        let issuer = SecurityToken::issuer(self);
        let mut claims = Vec::new();
        for (claim_type, value) in &self.claims_source().payload {
            match value {
                Value::Array(values) => claims.extend(
                    values
                        .iter()
                        .map(|v| Claim::new(claim_type, claim_value(v)).with_issuer(issuer)),
                ),
                Value::Null => {}
                other => claims.push(Claim::new(claim_type, claim_value(other)).with_issuer(issuer)),
            }
        }
        claims
    }
}
