//! JSON Web Tokens
//!
//! Compact JWS tokens are read into a [`JsonWebToken`] and run through the
//! checks in this order:
//!
//! ```text
//! lifetime → audience → issuer → token replay → actor → token type
//!          → signature → issuer signing key
//! ```
//!
//! The first failing check ends validation. Signature and issuer failures
//! are retried against a refreshed configuration and then against
//! last-known-good configurations.
//!
//! Encrypted tokens (JWE, five segments) are decrypted by a caller-supplied
//! [`TokenDecryptor`]; the decrypted JWS is validated and returned inside
//! the outer token.

mod handler;
pub mod signature;
mod token;

pub use handler::{JsonWebTokenHandler, TokenDecryptor};
pub use signature::validate_signature;
pub use token::{ACTOR_CLAIM, JsonWebToken, TokenReadError};
