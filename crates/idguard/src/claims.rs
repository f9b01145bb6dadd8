//! Claims and claims identities

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validated::ValidatedToken;

/// A single statement about the subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type (`sub`, `name`, `role`, ...)
    pub claim_type: String,
    /// Value in string form; JSON objects are kept as serialized JSON
    pub value: String,
    /// Issuer of the token the claim came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Claim {
    /// New claim without an issuer
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: None,
        }
    }

    /// Set the issuer
    pub fn with_issuer(mut self, issuer: Option<&str>) -> Self {
        self.issuer = issuer.map(str::to_owned);
        self
    }
}

/// Claims about one subject, with the claim types that carry its name and roles
///
/// # Example
///
/// ```rust
/// use idguard::claims::{Claim, ClaimsIdentity};
///
/// let identity = ClaimsIdentity::new("Bearer")
///     .with_claim(Claim::new("name", "alice"))
///     .with_claim(Claim::new("role", "admin"))
///     .with_claim(Claim::new("role", "reader"));
///
/// assert_eq!(identity.name(), Some("alice"));
/// assert!(identity.is_in_role("reader"));
/// assert_eq!(identity.to_claims_map()["role"], serde_json::json!(["admin", "reader"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsIdentity {
    authentication_type: String,
    name_claim_type: String,
    role_claim_type: String,
    claims: Vec<Claim>,
    actor: Option<Box<ClaimsIdentity>>,
}

impl ClaimsIdentity {
    /// Empty identity using the `name` and `role` claim types
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: crate::parameters::DEFAULT_NAME_CLAIM_TYPE.to_string(),
            role_claim_type: crate::parameters::DEFAULT_ROLE_CLAIM_TYPE.to_string(),
            claims: Vec::new(),
            actor: None,
        }
    }

    /// Default mapping of a validated token: every token claim, the claim
    /// types and authentication type of its parameters, and the actor's
    /// identity when an actor token was validated
    pub fn from_validated_token(validated: &ValidatedToken) -> Self {
        let parameters = validated.validation_parameters();
        Self {
            authentication_type: parameters.authentication_type.clone(),
            name_claim_type: parameters.name_claim_type.clone(),
            role_claim_type: parameters.role_claim_type.clone(),
            claims: validated.security_token().claims(),
            actor: validated
                .actor()
                .map(|actor| Box::new(actor.claims_identity().clone())),
        }
    }

    /// Use `name_claim_type` and `role_claim_type` for [`name`](Self::name)
    /// and [`roles`](Self::roles)
    pub fn with_claim_types(
        mut self,
        name_claim_type: impl Into<String>,
        role_claim_type: impl Into<String>,
    ) -> Self {
        self.name_claim_type = name_claim_type.into();
        self.role_claim_type = role_claim_type.into();
        self
    }

    /// Add a claim
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Set the actor identity
    pub fn with_actor(mut self, actor: ClaimsIdentity) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    /// Add a claim in place
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// How the subject authenticated
    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    /// Identities with an authentication type are authenticated
    pub fn is_authenticated(&self) -> bool {
        !self.authentication_type.is_empty()
    }

    /// Claim type carrying the name
    pub fn name_claim_type(&self) -> &str {
        &self.name_claim_type
    }

    /// Claim type carrying roles
    pub fn role_claim_type(&self) -> &str {
        &self.role_claim_type
    }

    /// All claims, in token order
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// First claim of `claim_type`
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Every claim of `claim_type`
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    /// Whether a claim with this type and value exists
    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.find_all(claim_type).any(|c| c.value == value)
    }

    /// Value of the first name claim
    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type).map(|c| c.value.as_str())
    }

    /// Values of every role claim
    pub fn roles(&self) -> Vec<&str> {
        self.find_all(&self.role_claim_type)
            .map(|c| c.value.as_str())
            .collect()
    }

    /// Whether `role` is among the role claims
    pub fn is_in_role(&self, role: &str) -> bool {
        self.has_claim(&self.role_claim_type, role)
    }

    /// Identity of the party acting on behalf of the subject
    pub fn actor(&self) -> Option<&ClaimsIdentity> {
        self.actor.as_deref()
    }

    /// Claims keyed by type; a type that occurs more than once maps to an array
    pub fn to_claims_map(&self) -> HashMap<String, Value> {
        let mut map: HashMap<String, Value> = HashMap::new();
        for claim in &self.claims {
            let value = Value::String(claim.value.clone());
            match map.get_mut(&claim.claim_type) {
                None => {
                    map.insert(claim.claim_type.clone(), value);
                }
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_and_roles_follow_claim_types() {
        let identity = ClaimsIdentity::new("Federation")
            .with_claim(Claim::new("upn", "alice@example.com"))
            .with_claim(Claim::new("name", "Alice"))
            .with_claim(Claim::new("groups", "ops"))
            .with_claim_types("upn", "groups");

        assert_eq!(identity.name(), Some("alice@example.com"));
        assert_eq!(identity.roles(), ["ops"]);
        assert!(!identity.is_in_role("admin"));
    }

    #[test]
    fn test_claims_map_flattens_repeated_types() {
        let identity = ClaimsIdentity::new("Federation")
            .with_claim(Claim::new("sub", "42"))
            .with_claim(Claim::new("aud", "a"))
            .with_claim(Claim::new("aud", "b"))
            .with_claim(Claim::new("aud", "c"));

        let map = identity.to_claims_map();
        assert_eq!(map["sub"], json!("42"));
        assert_eq!(map["aud"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_authentication_and_actor() {
        let actor = ClaimsIdentity::new("Federation").with_claim(Claim::new("name", "service"));
        let identity = ClaimsIdentity::new("").with_actor(actor);

        assert!(!identity.is_authenticated());
        assert_eq!(identity.actor().and_then(ClaimsIdentity::name), Some("service"));
    }
}
