//! JWT validation against a static issuer configuration
//!
//! This example:
//! 1. Mints a few HS256 tokens, some of them broken on purpose
//! 2. Validates them against an issuer configuration holding the signing key
//! 3. Prints the claims of accepted tokens and the exception type of rejected ones
//!
//! Run with `RUST_LOG=idguard=debug` to see each check.

use std::error::Error;
use std::sync::Arc;

use chrono::{Duration, Utc};
use idguard::configuration::{OpenIdConnectConfiguration, StaticConfigurationManager};
use idguard::jwt::JsonWebTokenHandler;
use idguard::keys::SigningKey;
use idguard::{CallContext, TokenHandler, ValidationParameters};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const ISSUER: &str = "https://login.example.com";
const AUDIENCE: &str = "api://orders";
const SECRET: &[u8] = b"example-signing-secret-of-decent-length";

fn mint(claims: &serde_json::Value, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("example-key".to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let configuration = OpenIdConnectConfiguration::new(ISSUER)
        .with_signing_key(SigningKey::symmetric(SECRET).with_key_id("example-key"));
    let parameters = ValidationParameters::new()
        .with_valid_audiences([AUDIENCE])
        .with_configuration_manager(Arc::new(StaticConfigurationManager::new(configuration)));

    let now = Utc::now();
    let claims = json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "alice",
        "name": "Alice",
        "role": ["reader", "writer"],
        "nbf": now.timestamp(),
        "exp": (now + Duration::hours(1)).timestamp(),
    });
    let mut expired = claims.clone();
    expired["exp"] = json!((now - Duration::hours(1)).timestamp());
    let mut foreign = claims.clone();
    foreign["aud"] = json!("api://billing");

    let tokens = [
        ("valid", mint(&claims, SECRET)?),
        ("expired", mint(&expired, SECRET)?),
        ("wrong audience", mint(&foreign, SECRET)?),
        ("forged", mint(&claims, b"someone-else's-secret")?),
        ("garbage", "not.a.jwt".to_string()),
    ];

    let handler = JsonWebTokenHandler::new();
    for (label, token) in &tokens {
        let result = handler
            .validate_token(token, &parameters, &CallContext::new(), &CancellationToken::new())
            .await;
        match result {
            Ok(validated) => {
                let identity = validated.claims_identity();
                println!(
                    "{label:>15}: accepted, name={:?} roles={:?}",
                    identity.name(),
                    identity.roles()
                );
            }
            Err(error) => println!("{label:>15}: rejected, {} ({error})", error.exception_type()),
        }
    }

    Ok(())
}
