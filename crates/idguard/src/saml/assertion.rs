use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::Claim;
use crate::token::{SecurityToken, TokenKind};

/// Claim type the subject's `NameID` is mapped to
pub const NAME_IDENTIFIER_CLAIM: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

/// SAML assertion version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamlVersion {
    /// SAML 1.1
    #[serde(rename = "1.1")]
    V1_1,
    /// SAML 2.0
    #[serde(rename = "2.0")]
    V2_0,
}

impl fmt::Display for SamlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SamlVersion::V1_1 => "1.1",
            SamlVersion::V2_0 => "2.0",
        })
    }
}

/// `<AudienceRestriction>`: the assertion is addressed to one of these audiences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Accepted audiences
    pub audiences: Vec<String>,
}

impl AudienceRestriction {
    /// Restriction to `audiences`
    pub fn new<I, S>(audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            audiences: audiences.into_iter().map(Into::into).collect(),
        }
    }
}

/// `<ProxyRestriction>`: limits on assertions issued on the basis of this one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRestriction {
    /// Maximum number of indirections
    pub count: Option<u32>,
    /// Audiences new assertions may be issued to
    pub audiences: Vec<String>,
}

/// `<Conditions>` of an assertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlConditions {
    /// `NotBefore`
    pub not_before: Option<DateTime<Utc>>,
    /// `NotOnOrAfter`
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Every restriction must be satisfied
    pub audience_restrictions: Vec<AudienceRestriction>,
    /// `<OneTimeUse>` (SAML 2.0)
    pub one_time_use: bool,
    /// `<ProxyRestriction>` (SAML 2.0)
    pub proxy_restriction: Option<ProxyRestriction>,
}

/// `<Attribute>` with its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    /// Attribute name, used as claim type
    pub name: String,
    /// Values in document order
    pub values: Vec<String>,
}

impl SamlAttribute {
    /// Attribute with values
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// What the reader learned about the enveloped signature
///
/// The signature itself is checked by a
/// [`SamlSignatureVerifier`](super::SamlSignatureVerifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlSignatureInfo {
    /// `SignatureMethod` algorithm URI
    pub algorithm: String,
    /// Key name or identifier from `<KeyInfo>`
    pub key_id: Option<String>,
}

/// A SAML assertion as produced by a [`SamlTokenReader`](super::SamlTokenReader)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAssertion {
    /// Assertion version
    pub version: SamlVersion,
    /// `ID` (2.0) or `AssertionID` (1.1); replay detection is keyed by it
    pub id: String,
    /// `<Issuer>` (2.0) or `Issuer` attribute (1.1)
    pub issuer: Option<String>,
    /// `IssueInstant`
    pub issue_instant: Option<DateTime<Utc>>,
    /// Subject `NameID`
    pub subject: Option<String>,
    /// `<Conditions>`
    pub conditions: Option<SamlConditions>,
    /// Attribute statements
    pub attributes: Vec<SamlAttribute>,
    /// Enveloped signature, absent for unsigned assertions
    pub signature: Option<SamlSignatureInfo>,
    /// The serialized assertion as received
    #[serde(skip)]
    pub raw: String,
}

impl SamlAssertion {
    /// Unsigned assertion with no conditions, subject or attributes
    pub fn new(version: SamlVersion, id: impl Into<String>) -> Self {
        Self {
            version,
            id: id.into(),
            issuer: None,
            issue_instant: None,
            subject: None,
            conditions: None,
            attributes: Vec::new(),
            signature: None,
            raw: String::new(),
        }
    }
}

impl SecurityToken for SamlAssertion {
    fn kind(&self) -> TokenKind {
        match self.version {
            SamlVersion::V1_1 => TokenKind::Saml,
            SamlVersion::V2_0 => TokenKind::Saml2,
        }
    }

    fn id(&self) -> Option<&str> {
        Some(&self.id).filter(|id| !id.is_empty()).map(String::as_str)
    }

    fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Audiences of every restriction
    fn audiences(&self) -> Vec<String> {
        self.conditions
            .iter()
            .flat_map(|c| &c.audience_restrictions)
            .flat_map(|r| r.audiences.iter().cloned())
            .collect()
    }

    fn not_before(&self) -> Option<DateTime<Utc>> {
        self.conditions.as_ref().and_then(|c| c.not_before)
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.conditions.as_ref().and_then(|c| c.not_on_or_after)
    }

    fn key_id(&self) -> Option<&str> {
        self.signature.as_ref().and_then(|s| s.key_id.as_deref())
    }

    fn algorithm(&self) -> Option<&str> {
        self.signature.as_ref().map(|s| s.algorithm.as_str())
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    /// The `NameID` as a name identifier claim, then one claim per attribute value
    fn claims(&self) -> Vec<Claim> {
        let issuer = self.issuer.as_deref();
        let name_id = self
            .subject
            .iter()
            .map(|subject| Claim::new(NAME_IDENTIFIER_CLAIM, subject.as_str()).with_issuer(issuer));
        let attributes = self.attributes.iter().flat_map(|attribute| {
            attribute
                .values
                .iter()
                .map(|value| Claim::new(attribute.name.as_str(), value.as_str()).with_issuer(issuer))
        });
        name_id.chain(attributes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_token_view_of_assertion() {
        let mut assertion = SamlAssertion::new(SamlVersion::V2_0, "_a1");
        assertion.issuer = Some("https://idp.example.com".into());
        assertion.subject = Some("alice".into());
        assertion.attributes = vec![SamlAttribute::new("role", ["admin", "reader"])];
        assertion.conditions = Some(SamlConditions {
            not_before: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            not_on_or_after: Some(Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap()),
            audience_restrictions: vec![
                AudienceRestriction::new(["https://sp/a"]),
                AudienceRestriction::new(["https://sp/b", "https://sp/c"]),
            ],
            ..SamlConditions::default()
        });
        assertion.signature = Some(SamlSignatureInfo {
            algorithm: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".into(),
            key_id: Some("idp-2026".into()),
        });

        assert_eq!(assertion.kind(), TokenKind::Saml2);
        assert_eq!(assertion.id(), Some("_a1"));
        assert_eq!(assertion.audiences(), ["https://sp/a", "https://sp/b", "https://sp/c"]);
        assert_eq!(assertion.key_id(), Some("idp-2026"));
        assert!(assertion.expires() > assertion.not_before());

        let claims = assertion.claims();
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[0].claim_type, NAME_IDENTIFIER_CLAIM);
        assert_eq!(claims[2].value, "reader");
        assert_eq!(claims[2].issuer.as_deref(), Some("https://idp.example.com"));
    }

    #[test]
    fn test_unconditioned_assertion() {
        let assertion = SamlAssertion::new(SamlVersion::V1_1, "");
        assert_eq!(assertion.kind(), TokenKind::Saml);
        assert_eq!(assertion.id(), None);
        assert!(assertion.audiences().is_empty());
        assert_eq!(assertion.expires(), None);
        assert_eq!(assertion.algorithm(), None);
    }
}
