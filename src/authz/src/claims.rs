//! Claims extraction
//!
//! Maps the claim set of a token that the resource-server boundary has
//! already verified (signature, expiry, audience) onto an [`Identity`].
//! Nothing here touches cryptography.

use crate::error::{AuthzError, Result};
use crate::types::Identity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Default claim carrying the subject email
pub const DEFAULT_EMAIL_CLAIM: &str = "email";

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Claim set of a verified token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifiedToken {
    claims: Map<String, Value>,
}

impl VerifiedToken {
    /// Wrap a verified claim set
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Build from a JSON value; non-object values yield an empty claim set
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(claims) => Self { claims },
            _ => Self::default(),
        }
    }

    /// Add a claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Raw claim lookup
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Claims extractor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Claim holding the subject email
    pub email_claim: String,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            email_claim: DEFAULT_EMAIL_CLAIM.to_string(),
        }
    }
}

/// Normalizes verified token claims into an [`Identity`]
#[derive(Debug, Clone, Default)]
pub struct ClaimsExtractor {
    config: ClaimsConfig,
}

impl ClaimsExtractor {
    /// Create an extractor with custom settings
    pub fn new(config: ClaimsConfig) -> Self {
        Self { config }
    }

    /// Build an identity from a verified token
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::MalformedClaims`] when the email claim is absent,
    /// not a string, or not shaped like an email address. The email is kept
    /// verbatim: no trimming, no case folding.
    pub fn extract(&self, token: &VerifiedToken) -> Result<Identity> {
        let claim = &self.config.email_claim;

        let email = match token.claim(claim) {
            Some(Value::String(email)) => email,
            Some(other) => {
                return Err(AuthzError::MalformedClaims(format!(
                    "claim '{}' must be a string, got {}",
                    claim,
                    json_kind(other)
                )))
            }
            None => {
                return Err(AuthzError::MalformedClaims(format!(
                    "required claim '{}' is missing",
                    claim
                )))
            }
        };

        if !is_well_formed_email(email) {
            return Err(AuthzError::MalformedClaims(format!(
                "claim '{}' is not a well-formed email",
                claim
            )));
        }

        let raw_claims: HashMap<String, String> = token
            .claims
            .iter()
            .map(|(k, v)| (k.clone(), render_claim(v)))
            .collect();

        Ok(Identity::new(email.clone(), raw_claims))
    }
}

/// Syntactic email check: one `@`, a dotted domain, no whitespace
pub fn is_well_formed_email(candidate: &str) -> bool {
    EMAIL_PATTERN.is_match(candidate)
}

fn render_claim(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
