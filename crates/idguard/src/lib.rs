//! # idguard - Security Token Validation
//!
//! Validation of identity tokens (JWT, SAML 1.1, SAML 2.0) issued by identity
//! providers, with typed validation errors and issuer configuration refresh.
//!
//! ## Design Principles
//!
//! - **Errors are values**: every failed check returns a [`ValidationError`]
//!   with a typed payload; nothing panics through the caller
//! - **Pluggable checks**: each check has a default and can be replaced per
//!   call through [`Validators`]
//! - **Self-healing configuration**: signature and issuer failures are retried
//!   against refreshed and last-known-good issuer configurations
//!
//! ## Architecture
//!
//! - [`error`] - `ValidationResult`, `ValidationError` and the exception taxonomy
//! - [`validators`] - default checks and the override surface
//! - [`configuration`] - configuration manager, retriever and last-known-good history
//! - [`jwt`] - JWT reading and the JWT handler
//! - [`saml`] - SAML assertion model and the SAML 1.1 / 2.0 handlers
//! - [`validated`] and [`claims`] - the validated token and its claims identity
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use idguard::configuration::{
//!     ConfigurationManager, OpenIdConnectConfiguration, OpenIdConnectConfigurationRetriever,
//! };
//! use idguard::jwt::JsonWebTokenHandler;
//! use idguard::token::TokenHandler;
//! use idguard::{CallContext, ValidationParameters};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigurationManager::<OpenIdConnectConfiguration>::new(
//!     "https://login.example.com/.well-known/openid-configuration",
//!     OpenIdConnectConfigurationRetriever::new(),
//! )?;
//!
//! let parameters = ValidationParameters::new()
//!     .with_valid_audiences(["api://orders"])
//!     .with_configuration_manager(Arc::new(manager));
//!
//! match JsonWebTokenHandler::new()
//!     .validate_token(token, &parameters, &CallContext::new(), &CancellationToken::new())
//!     .await
//! {
//!     Ok(validated) => println!("hello {:?}", validated.claims_identity().name()),
//!     Err(error) => println!("rejected: {error} ({})", error.exception_type()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - configuration refresh and validation counters through the `metrics` facade
//! - `full` - all features enabled

pub mod claims;
pub mod configuration;
pub mod context;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod parameters;
mod recovery;
pub mod replay_cache;
pub mod saml;
pub mod time;
pub mod token;
pub mod validated;
pub mod validators;

#[cfg(test)]
mod test_support;

#[doc(inline)]
pub use claims::{Claim, ClaimsIdentity};
#[doc(inline)]
pub use context::CallContext;
#[doc(inline)]
pub use error::{
    ErrorDetail, ExceptionType, MessageDetail, SecurityTokenException, ValidationError,
    ValidationFailureType, ValidationResult, ValidationResultExt,
};
#[doc(inline)]
pub use metrics::init_validation_metrics;
#[doc(inline)]
pub use parameters::ValidationParameters;
#[doc(inline)]
pub use token::{SecurityToken, TokenHandler, TokenKind};
#[doc(inline)]
pub use validated::ValidatedToken;
#[doc(inline)]
pub use validators::Validators;
