//! Exception taxonomy produced from validation errors

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    ErrorDetail, InnerError, LifetimeFailureKind, SignatureFailure, TokenReplayFailureKind,
    ValidationError,
};

/// Exception kind an [`ErrorDetail`] maps to
///
/// Retry eligibility in the orchestrators is decided from this value alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ExceptionType {
    InvalidAudience,
    InvalidIssuer,
    Expired,
    NotYetValid,
    NoExpiration,
    InvalidLifetime,
    InvalidSignature,
    SignatureKeyNotFound,
    InvalidSigningKey,
    InvalidAlgorithm,
    InvalidType,
    ReplayDetected,
    ReplayAddFailed,
    ArgumentNull,
    Malformed,
    DecryptionFailed,
    Generic,
    /// A type this crate has no variant for
    Custom(String),
}

impl ExceptionType {
    /// Stable name used in logs and metric labels
    pub fn name(&self) -> &str {
        match self {
            ExceptionType::InvalidAudience => "SecurityTokenInvalidAudienceException",
            ExceptionType::InvalidIssuer => "SecurityTokenInvalidIssuerException",
            ExceptionType::Expired => "SecurityTokenExpiredException",
            ExceptionType::NotYetValid => "SecurityTokenNotYetValidException",
            ExceptionType::NoExpiration => "SecurityTokenNoExpirationException",
            ExceptionType::InvalidLifetime => "SecurityTokenInvalidLifetimeException",
            ExceptionType::InvalidSignature => "SecurityTokenInvalidSignatureException",
            ExceptionType::SignatureKeyNotFound => "SecurityTokenSignatureKeyNotFoundException",
            ExceptionType::InvalidSigningKey => "SecurityTokenInvalidSigningKeyException",
            ExceptionType::InvalidAlgorithm => "SecurityTokenInvalidAlgorithmException",
            ExceptionType::InvalidType => "SecurityTokenInvalidTypeException",
            ExceptionType::ReplayDetected => "SecurityTokenReplayDetectedException",
            ExceptionType::ReplayAddFailed => "SecurityTokenReplayAddFailedException",
            ExceptionType::ArgumentNull => "ArgumentNullException",
            ExceptionType::Malformed => "SecurityTokenMalformedException",
            ExceptionType::DecryptionFailed => "SecurityTokenDecryptionFailedException",
            ExceptionType::Generic => "SecurityTokenException",
            ExceptionType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exception form of a [`ValidationError`]
///
/// `message` is always the scrubbed message; `source` is the inner error of the
/// validation error, or the nested exception for signature failures caused by
/// algorithm validation.
#[derive(Debug, Error)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum SecurityTokenException {
    #[error("{message}")]
    InvalidAudience {
        message: String,
        token_audiences: Vec<String>,
        valid_audiences: Vec<String>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidIssuer {
        message: String,
        invalid_issuer: Option<String>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    Expired {
        message: String,
        not_before: Option<DateTime<Utc>>,
        expires: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    NotYetValid {
        message: String,
        not_before: Option<DateTime<Utc>>,
        expires: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    NoExpiration {
        message: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidLifetime {
        message: String,
        not_before: Option<DateTime<Utc>>,
        expires: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidSignature {
        message: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    SignatureKeyNotFound {
        message: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidSigningKey {
        message: String,
        key_id: Option<String>,
        not_before: Option<DateTime<Utc>>,
        not_after: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidAlgorithm {
        message: String,
        invalid_algorithm: Option<String>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    InvalidType {
        message: String,
        invalid_type: Option<String>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    ReplayDetected {
        message: String,
        expiration: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    ReplayAddFailed {
        message: String,
        expiration: Option<DateTime<Utc>>,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    ArgumentNull {
        message: String,
        parameter: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    Malformed {
        message: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    DecryptionFailed {
        message: String,
        source: Option<InnerError>,
    },

    #[error("{message}")]
    Generic {
        message: String,
        source: Option<InnerError>,
    },
}

impl SecurityTokenException {
    /// Build the exception for a validation error
    ///
    /// Unknown (custom) exception types fall back to [`SecurityTokenException::Generic`].
    pub fn from_validation_error(error: &ValidationError) -> Self {
        let message = error.message().to_string();
        let source = error.inner_error().cloned();

        match error.detail() {
            ErrorDetail::Generic => Self::Generic { message, source },
            ErrorDetail::Custom { exception_type } => Self::Generic {
                message: format!("{message} (unknown exception type '{exception_type}')"),
                source,
            },
            ErrorDetail::ArgumentNull { parameter } => Self::ArgumentNull {
                message,
                parameter: parameter.clone(),
                source,
            },
            ErrorDetail::Malformed => Self::Malformed { message, source },
            ErrorDetail::Decryption => Self::DecryptionFailed { message, source },
            ErrorDetail::Audience(audience) => Self::InvalidAudience {
                message,
                token_audiences: audience.token_audiences.clone(),
                valid_audiences: audience.valid_audiences.clone(),
                source,
            },
            ErrorDetail::Issuer { invalid_issuer } => Self::InvalidIssuer {
                message,
                invalid_issuer: invalid_issuer.clone(),
                source,
            },
            ErrorDetail::Lifetime(lifetime) => {
                let (not_before, expires) = (lifetime.not_before, lifetime.expires);
                match lifetime.kind {
                    LifetimeFailureKind::NoExpiration => Self::NoExpiration { message, source },
                    LifetimeFailureKind::InvalidLifetime => Self::InvalidLifetime {
                        message,
                        not_before,
                        expires,
                        source,
                    },
                    LifetimeFailureKind::NotYetValid => Self::NotYetValid {
                        message,
                        not_before,
                        expires,
                        source,
                    },
                    LifetimeFailureKind::Expired => Self::Expired {
                        message,
                        not_before,
                        expires,
                        source,
                    },
                }
            }
            ErrorDetail::TokenReplay(replay) => match replay.kind {
                TokenReplayFailureKind::NoExpiration => Self::NoExpiration { message, source },
                TokenReplayFailureKind::Detected => Self::ReplayDetected {
                    message,
                    expiration: replay.expiration,
                    source,
                },
                TokenReplayFailureKind::AddFailed => Self::ReplayAddFailed {
                    message,
                    expiration: replay.expiration,
                    source,
                },
            },
            ErrorDetail::TokenType { invalid_type } => Self::InvalidType {
                message,
                invalid_type: invalid_type.clone(),
                source,
            },
            ErrorDetail::Algorithm { invalid_algorithm } => Self::InvalidAlgorithm {
                message,
                invalid_algorithm: invalid_algorithm.clone(),
                source,
            },
            ErrorDetail::IssuerSigningKey(key) => Self::InvalidSigningKey {
                message,
                key_id: key.key_id.clone(),
                not_before: key.not_before,
                not_after: key.not_after,
                source,
            },
            ErrorDetail::Signature(signature) => {
                let source = nested_source(signature).or(source);
                match error.exception_type() {
                    ExceptionType::SignatureKeyNotFound => {
                        Self::SignatureKeyNotFound { message, source }
                    }
                    _ => Self::InvalidSignature { message, source },
                }
            }
        }
    }

    /// The scrubbed message
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidAudience { message, .. }
            | Self::InvalidIssuer { message, .. }
            | Self::Expired { message, .. }
            | Self::NotYetValid { message, .. }
            | Self::NoExpiration { message, .. }
            | Self::InvalidLifetime { message, .. }
            | Self::InvalidSignature { message, .. }
            | Self::SignatureKeyNotFound { message, .. }
            | Self::InvalidSigningKey { message, .. }
            | Self::InvalidAlgorithm { message, .. }
            | Self::InvalidType { message, .. }
            | Self::ReplayDetected { message, .. }
            | Self::ReplayAddFailed { message, .. }
            | Self::ArgumentNull { message, .. }
            | Self::Malformed { message, .. }
            | Self::DecryptionFailed { message, .. }
            | Self::Generic { message, .. } => message,
        }
    }

    /// Exception kind of this value
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            Self::InvalidAudience { .. } => ExceptionType::InvalidAudience,
            Self::InvalidIssuer { .. } => ExceptionType::InvalidIssuer,
            Self::Expired { .. } => ExceptionType::Expired,
            Self::NotYetValid { .. } => ExceptionType::NotYetValid,
            Self::NoExpiration { .. } => ExceptionType::NoExpiration,
            Self::InvalidLifetime { .. } => ExceptionType::InvalidLifetime,
            Self::InvalidSignature { .. } => ExceptionType::InvalidSignature,
            Self::SignatureKeyNotFound { .. } => ExceptionType::SignatureKeyNotFound,
            Self::InvalidSigningKey { .. } => ExceptionType::InvalidSigningKey,
            Self::InvalidAlgorithm { .. } => ExceptionType::InvalidAlgorithm,
            Self::InvalidType { .. } => ExceptionType::InvalidType,
            Self::ReplayDetected { .. } => ExceptionType::ReplayDetected,
            Self::ReplayAddFailed { .. } => ExceptionType::ReplayAddFailed,
            Self::ArgumentNull { .. } => ExceptionType::ArgumentNull,
            Self::Malformed { .. } => ExceptionType::Malformed,
            Self::DecryptionFailed { .. } => ExceptionType::DecryptionFailed,
            Self::Generic { .. } => ExceptionType::Generic,
        }
    }
}

fn nested_source(signature: &SignatureFailure) -> Option<InnerError> {
    signature
        .inner_validation_error
        .as_ref()
        .map(|nested| nested.get_exception() as InnerError)
}
