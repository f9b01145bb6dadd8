//! Validation result and error model
//!
//! Every check in the pipeline reports failure through a [`ValidationError`]
//! instead of panicking. An error carries:
//!
//! - a structured [`MessageDetail`] (template plus arguments, each argument
//!   marked as PII or not, so log lines can be scrubbed)
//! - a [`ValidationFailureType`] tag
//! - an [`ErrorDetail`] payload describing exactly what was rejected
//! - provenance frames, one per call site the error bubbled through
//! - an optional inner error (collaborator failure, validator panic)
//!
//! The error converts into a [`SecurityTokenException`] only when
//! [`ValidationError::get_exception`] is called; the conversion is memoized.
//!
//! # Example
//!
//! ```rust
//! use idguard::error::{
//!     ErrorDetail, MessageDetail, ValidationError, ValidationFailureType, ValidationResult,
//!     ValidationResultExt,
//! };
//!
//! fn check(issuer: &str) -> ValidationResult<String> {
//!     if issuer.is_empty() {
//!         return Err(ValidationError::new(
//!             MessageDetail::new("Issuer is empty."),
//!             ValidationFailureType::IssuerValidationFailed,
//!             ErrorDetail::Issuer { invalid_issuer: None },
//!         ));
//!     }
//!     Ok(issuer.to_string())
//! }
//!
//! let err = check("").add_current_stack_frame().unwrap_err();
//! assert_eq!(err.stack_frames().len(), 2);
//! assert!(std::sync::Arc::ptr_eq(&err.get_exception(), &err.get_exception()));
//! ```

mod detail;
mod exception;

pub use detail::{
    AudienceFailure, ErrorDetail, LifetimeFailure, LifetimeFailureKind, SignatureFailure,
    SignatureFailureKind, SigningKeyFailure, SigningKeyFailureKind, TokenReplayFailure,
    TokenReplayFailureKind,
};
pub use exception::{ExceptionType, SecurityTokenException};

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock};

/// Result of a single validation step: the validated value or the reason it failed.
///
/// Unwrapping the wrong side is a programming error and panics, like any `Result`.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Shared, type-erased error used as the inner cause of a [`ValidationError`].
pub type InnerError = Arc<dyn std::error::Error + Send + Sync>;

/// Marker rendered in place of PII arguments.
pub const PII_HIDDEN: &str = "[PII is hidden]";

/// Tag identifying which check failed and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ValidationFailureType {
    /// A required argument was missing or empty
    NullArgument,
    /// The token is larger than the configured maximum
    TokenExceedsMaximumSize,
    /// The raw token could not be read
    TokenReadingFailed,
    /// An encrypted token could not be decrypted
    TokenDecryptionFailed,
    /// The caller cancelled validation
    OperationCancelled,
    /// No token audience matched a valid audience
    AudienceValidationFailed,
    /// The token carries no audience
    NoTokenAudiencesProvided,
    /// No valid audiences were configured
    NoValidationParameterAudiencesProvided,
    /// A caller-supplied audience validator panicked
    AudienceValidatorThrew,
    /// The issuer was rejected
    IssuerValidationFailed,
    /// A caller-supplied issuer validator panicked
    IssuerValidatorThrew,
    /// The lifetime was rejected
    LifetimeValidationFailed,
    /// A caller-supplied lifetime validator panicked
    LifetimeValidatorThrew,
    /// Replay detection rejected the token
    TokenReplayValidationFailed,
    /// A caller-supplied replay validator panicked
    TokenReplayValidatorThrew,
    /// The signing algorithm was rejected
    AlgorithmValidationFailed,
    /// A caller-supplied algorithm validator panicked
    AlgorithmValidatorThrew,
    /// The token type was rejected
    TokenTypeValidationFailed,
    /// A caller-supplied token type validator panicked
    TokenTypeValidatorThrew,
    /// The signing key was rejected
    IssuerSigningKeyValidationFailed,
    /// A caller-supplied signing key validator panicked
    IssuerSigningKeyValidatorThrew,
    /// The signature did not verify
    SignatureValidationFailed,
    /// A caller-supplied signature validator panicked
    SignatureValidatorThrew,
    /// Algorithm validation failed while validating the signature
    SignatureAlgorithmValidationFailed,
    /// The embedded actor token was rejected
    ActorTokenValidationFailed,
    /// A SAML condition (one-time use, proxy restriction) was rejected
    SamlConditionsValidationFailed,
    /// The token is structurally valid but unusable
    InvalidSecurityToken,
}

impl fmt::Display for ValidationFailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single message argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogArgument {
    value: String,
    is_pii: bool,
}

impl LogArgument {
    /// Argument that is safe to log
    pub fn safe(value: impl fmt::Display) -> Self {
        Self {
            value: value.to_string(),
            is_pii: false,
        }
    }

    /// Argument that may contain personal data and is hidden in scrubbed output
    pub fn pii(value: impl fmt::Display) -> Self {
        Self {
            value: value.to_string(),
            is_pii: true,
        }
    }

    /// Raw value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the value is PII
    pub fn is_pii(&self) -> bool {
        self.is_pii
    }

    fn render(&self, show_pii: bool) -> &str {
        if self.is_pii && !show_pii {
            PII_HIDDEN
        } else {
            &self.value
        }
    }
}

/// Message template with positional `{N}` placeholders and their arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    template: Cow<'static, str>,
    arguments: Vec<LogArgument>,
}

impl MessageDetail {
    /// Create a message from a template
    pub fn new(template: impl Into<Cow<'static, str>>) -> Self {
        Self {
            template: template.into(),
            arguments: Vec::new(),
        }
    }

    /// Append a non-PII argument
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.arguments.push(LogArgument::safe(value));
        self
    }

    /// Append a PII argument
    pub fn pii_arg(mut self, value: impl fmt::Display) -> Self {
        self.arguments.push(LogArgument::pii(value));
        self
    }

    /// The template, placeholders intact
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The arguments in placeholder order
    pub fn arguments(&self) -> &[LogArgument] {
        &self.arguments
    }

    /// Render the message, replacing PII arguments with [`PII_HIDDEN`] unless `show_pii`
    pub fn render(&self, show_pii: bool) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest: &str = &self.template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let argument = after.find('}').and_then(|close| {
                after[..close]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.arguments.get(index))
                    .map(|arg| (arg, close))
            });
            match argument {
                Some((arg, close)) => {
                    out.push_str(arg.render(show_pii));
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for MessageDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

/// Call site an error was created at or passed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackFrame {
    /// Source file
    pub file: &'static str,
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl StackFrame {
    /// Frame for the caller of this function
    #[track_caller]
    pub fn current() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for StackFrame {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A validation failure
///
/// Cheap to move (boxed body). Cloning keeps the memoized exception shared.
#[derive(Clone)]
pub struct ValidationError {
    inner: Box<ErrorInner>,
}

#[derive(Clone)]
struct ErrorInner {
    message: MessageDetail,
    failure_type: ValidationFailureType,
    detail: ErrorDetail,
    stack_frames: Vec<StackFrame>,
    inner_error: Option<InnerError>,
    exception: OnceLock<Arc<SecurityTokenException>>,
}

impl ValidationError {
    /// Create an error; the caller's location becomes the first provenance frame
    #[track_caller]
    pub fn new(
        message: MessageDetail,
        failure_type: ValidationFailureType,
        detail: ErrorDetail,
    ) -> Self {
        Self::new_at(StackFrame::current(), message, failure_type, detail)
    }

    /// Create an error with an explicit origin frame
    pub fn new_at(
        origin: StackFrame,
        message: MessageDetail,
        failure_type: ValidationFailureType,
        detail: ErrorDetail,
    ) -> Self {
        Self {
            inner: Box::new(ErrorInner {
                message,
                failure_type,
                detail,
                stack_frames: vec![origin],
                inner_error: None,
                exception: OnceLock::new(),
            }),
        }
    }

    /// A required argument was null or empty
    #[track_caller]
    pub fn null_argument(parameter: &str) -> Self {
        Self::new(
            MessageDetail::new("Argument '{0}' is null or empty.").arg(parameter),
            ValidationFailureType::NullArgument,
            ErrorDetail::ArgumentNull {
                parameter: parameter.to_string(),
            },
        )
    }

    /// Attach the error that caused this failure
    pub fn with_inner_error<E>(self, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.with_shared_inner_error(Arc::new(error))
    }

    /// Attach an already shared cause
    pub fn with_shared_inner_error(mut self, error: InnerError) -> Self {
        self.inner.inner_error = Some(error);
        self.inner.exception = OnceLock::new();
        self
    }

    /// Record the caller's location as an additional provenance frame
    #[track_caller]
    pub fn add_current_stack_frame(self) -> Self {
        self.add_stack_frame(StackFrame::current())
    }

    /// Record an additional provenance frame
    pub fn add_stack_frame(mut self, frame: StackFrame) -> Self {
        self.inner.stack_frames.push(frame);
        self
    }

    /// Structured message
    pub fn message(&self) -> &MessageDetail {
        &self.inner.message
    }

    /// Message with PII arguments included; never log this
    pub fn unscrubbed_message(&self) -> String {
        self.inner.message.render(true)
    }

    /// Failure tag
    pub fn failure_type(&self) -> ValidationFailureType {
        self.inner.failure_type
    }

    /// Failure payload
    pub fn detail(&self) -> &ErrorDetail {
        &self.inner.detail
    }

    /// Provenance frames, creation site first
    pub fn stack_frames(&self) -> &[StackFrame] {
        &self.inner.stack_frames
    }

    /// The underlying cause, if any
    pub fn inner_error(&self) -> Option<&InnerError> {
        self.inner.inner_error.as_ref()
    }

    /// Exception type this error converts into
    pub fn exception_type(&self) -> ExceptionType {
        self.inner.detail.exception_type()
    }

    /// Convert into an exception; built on first call and reused afterwards
    pub fn get_exception(&self) -> Arc<SecurityTokenException> {
        Arc::clone(
            self.inner
                .exception
                .get_or_init(|| Arc::new(SecurityTokenException::from_validation_error(self))),
        )
    }
}

impl fmt::Debug for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationError")
            .field("failure_type", &self.inner.failure_type)
            .field("message", &self.inner.message.to_string())
            .field("detail", &self.inner.detail)
            .field("stack_frames", &self.inner.stack_frames)
            .field(
                "inner_error",
                &self.inner.inner_error.as_ref().map(ToString::to_string),
            )
            .finish()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.failure_type, self.inner.message)
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .inner_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Provenance helpers on [`ValidationResult`]
pub trait ValidationResultExt {
    /// Record the caller's location on the error side; the value side is untouched
    #[track_caller]
    fn add_current_stack_frame(self) -> Self;
}

impl<T> ValidationResultExt for ValidationResult<T> {
    #[track_caller]
    fn add_current_stack_frame(self) -> Self {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(error.add_current_stack_frame()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audience_error() -> ValidationError {
        ValidationError::new(
            MessageDetail::new("Audiences '{0}' did not match '{1}'.")
                .pii_arg("https://a/")
                .arg("https://b"),
            ValidationFailureType::AudienceValidationFailed,
            ErrorDetail::Audience(AudienceFailure {
                token_audiences: vec!["https://a/".into()],
                valid_audiences: vec!["https://b".into()],
            }),
        )
    }

    #[test]
    fn test_message_scrubs_pii() {
        let err = audience_error();
        assert_eq!(
            err.message().to_string(),
            format!("Audiences '{PII_HIDDEN}' did not match 'https://b'.")
        );
        assert_eq!(
            err.unscrubbed_message(),
            "Audiences 'https://a/' did not match 'https://b'."
        );
    }

    #[test]
    fn test_message_keeps_unknown_placeholders() {
        let message = MessageDetail::new("{0} {x} {7} {").arg("a");
        assert_eq!(message.render(true), "a {x} {7} {");
    }

    #[test]
    fn test_stack_frames_accumulate() {
        let err = audience_error().add_current_stack_frame();
        assert_eq!(err.stack_frames().len(), 2);
        assert!(err.stack_frames()[0].file.ends_with("mod.rs"));

        let result: ValidationResult<()> = Err(err);
        let err = result.add_current_stack_frame().unwrap_err();
        assert_eq!(err.stack_frames().len(), 3);
    }

    #[test]
    fn test_get_exception_is_memoized() {
        let err = audience_error();
        let first = err.get_exception();
        let second = err.get_exception();
        assert!(Arc::ptr_eq(&first, &second));

        // clones share the memoized instance once it exists
        let clone = err.clone();
        assert!(Arc::ptr_eq(&first, &clone.get_exception()));
    }

    #[test]
    fn test_exception_carries_payload() {
        let err = audience_error();
        match err.get_exception().as_ref() {
            SecurityTokenException::InvalidAudience {
                token_audiences,
                valid_audiences,
                ..
            } => {
                assert_eq!(token_audiences, &vec!["https://a/".to_string()]);
                assert_eq!(valid_audiences, &vec!["https://b".to_string()]);
            }
            other => panic!("unexpected exception {other:?}"),
        }
    }

    #[test]
    fn test_inner_error_is_source() {
        let io = std::io::Error::other("boom");
        let err = audience_error().with_inner_error(io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn test_null_argument() {
        let err = ValidationError::null_argument("token");
        assert_eq!(err.failure_type(), ValidationFailureType::NullArgument);
        assert_eq!(err.exception_type(), ExceptionType::ArgumentNull);
        assert_eq!(err.to_string(), "NullArgument: Argument 'token' is null or empty.");
    }
}
