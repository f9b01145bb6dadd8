//! Per-check failure payloads

use chrono::{DateTime, Utc};

use super::{ExceptionType, ValidationError};

/// What exactly a failed check rejected
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ErrorDetail {
    /// No structured payload
    Generic,
    /// A required argument was missing
    ArgumentNull {
        /// Name of the argument
        parameter: String,
    },
    /// The token could not be read
    Malformed,
    /// The token could not be decrypted
    Decryption,
    /// Audience mismatch
    Audience(AudienceFailure),
    /// Issuer rejected
    Issuer {
        /// The rejected issuer, absent when the token carried none
        invalid_issuer: Option<String>,
    },
    /// Lifetime rejected
    Lifetime(LifetimeFailure),
    /// Replay detection rejected the token
    TokenReplay(TokenReplayFailure),
    /// Token type rejected
    TokenType {
        /// The rejected `typ`, absent when the token carried none
        invalid_type: Option<String>,
    },
    /// Signing algorithm rejected
    Algorithm {
        /// The rejected algorithm
        invalid_algorithm: Option<String>,
    },
    /// Signing key rejected
    IssuerSigningKey(SigningKeyFailure),
    /// Signature rejected
    Signature(SignatureFailure),
    /// Caller-defined failure; converts to a generic exception
    Custom {
        /// Name of the exception type the caller intended
        exception_type: String,
    },
}

/// Audiences involved in a failed audience check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceFailure {
    /// Audiences carried by the token
    pub token_audiences: Vec<String>,
    /// Audiences accepted by the validation parameters
    pub valid_audiences: Vec<String>,
}

/// Why a lifetime was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeFailureKind {
    /// The token has no expiration
    NoExpiration,
    /// `not_before` is after `expires`
    InvalidLifetime,
    /// `not_before` is in the future
    NotYetValid,
    /// `expires` is in the past
    Expired,
}

/// Lifetime values involved in a failed lifetime check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimeFailure {
    /// Failure reason
    pub kind: LifetimeFailureKind,
    /// Token `nbf`
    pub not_before: Option<DateTime<Utc>>,
    /// Token `exp`
    pub expires: Option<DateTime<Utc>>,
}

/// Why replay detection rejected a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenReplayFailureKind {
    /// A replay cache is configured but the token has no expiration
    NoExpiration,
    /// The token was already seen
    Detected,
    /// The replay cache refused the token
    AddFailed,
}

/// Replay-check values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenReplayFailure {
    /// Failure reason
    pub kind: TokenReplayFailureKind,
    /// Expiration used for the cache entry
    pub expiration: Option<DateTime<Utc>>,
}

/// Why a signing key was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningKeyFailureKind {
    /// No key was available to validate
    Missing,
    /// The key is unusable
    Invalid,
    /// The key's validity window has not started
    NotYetValid,
    /// The key's validity window has ended
    Expired,
}

/// Signing key values involved in a failed key check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyFailure {
    /// Failure reason
    pub kind: SigningKeyFailureKind,
    /// `kid` of the rejected key
    pub key_id: Option<String>,
    /// Key validity start
    pub not_before: Option<DateTime<Utc>>,
    /// Key validity end
    pub not_after: Option<DateTime<Utc>>,
}

/// Why a signature was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailureKind {
    /// Keys were tried and none verified the signature
    Invalid,
    /// No candidate key could be found
    KeyNotFound,
}

/// Signature-check values
#[derive(Debug, Clone)]
pub struct SignatureFailure {
    /// Failure reason
    pub kind: SignatureFailureKind,
    /// Failure of a nested check (algorithm validation) that caused this one
    pub inner_validation_error: Option<Box<ValidationError>>,
}

impl ErrorDetail {
    /// Exception type this payload maps to
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            ErrorDetail::Generic => ExceptionType::Generic,
            ErrorDetail::ArgumentNull { .. } => ExceptionType::ArgumentNull,
            ErrorDetail::Malformed => ExceptionType::Malformed,
            ErrorDetail::Decryption => ExceptionType::DecryptionFailed,
            ErrorDetail::Audience(_) => ExceptionType::InvalidAudience,
            ErrorDetail::Issuer { .. } => ExceptionType::InvalidIssuer,
            ErrorDetail::Lifetime(lifetime) => match lifetime.kind {
                LifetimeFailureKind::NoExpiration => ExceptionType::NoExpiration,
                LifetimeFailureKind::InvalidLifetime => ExceptionType::InvalidLifetime,
                LifetimeFailureKind::NotYetValid => ExceptionType::NotYetValid,
                LifetimeFailureKind::Expired => ExceptionType::Expired,
            },
            ErrorDetail::TokenReplay(replay) => match replay.kind {
                TokenReplayFailureKind::NoExpiration => ExceptionType::NoExpiration,
                TokenReplayFailureKind::Detected => ExceptionType::ReplayDetected,
                TokenReplayFailureKind::AddFailed => ExceptionType::ReplayAddFailed,
            },
            ErrorDetail::TokenType { .. } => ExceptionType::InvalidType,
            ErrorDetail::Algorithm { .. } => ExceptionType::InvalidAlgorithm,
            ErrorDetail::IssuerSigningKey(_) => ExceptionType::InvalidSigningKey,
            ErrorDetail::Signature(signature) => match signature.kind {
                SignatureFailureKind::Invalid => ExceptionType::InvalidSignature,
                SignatureFailureKind::KeyNotFound => ExceptionType::SignatureKeyNotFound,
            },
            ErrorDetail::Custom { exception_type } => ExceptionType::Custom(exception_type.clone()),
        }
    }
}
