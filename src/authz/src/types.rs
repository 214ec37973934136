//! Core authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Authenticated subject for one request
///
/// Built by [`crate::claims::ClaimsExtractor`] from an already verified token.
/// Fields are private so an identity cannot be altered after extraction.
/// It serializes for audit output but cannot be deserialized:
///
/// ```compile_fail
/// let forged: accessguard_authz::Identity =
///     serde_json::from_str(r#"{"subject_email":"nope","raw_claims":{}}"#).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    subject_email: String,
    raw_claims: HashMap<String, String>,
}

impl Identity {
    pub(crate) fn new(subject_email: String, raw_claims: HashMap<String, String>) -> Self {
        Self {
            subject_email,
            raw_claims,
        }
    }

    /// Subject email exactly as asserted by the identity provider
    pub fn subject_email(&self) -> &str {
        &self.subject_email
    }

    /// All claims rendered as strings
    pub fn raw_claims(&self) -> &HashMap<String, String> {
        &self.raw_claims
    }

    /// Single claim lookup
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.raw_claims.get(name).map(String::as_str)
    }
}

/// Resource-side facts for one authorization request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Resource identifier (e.g., "employee:42", "payroll/2024")
    pub resource: String,

    /// Resource attributes (e.g., owner email)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    /// Create a context for a resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute to the context
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Machine-readable outcome of an evaluation
///
/// Infrastructure failures keep their own codes even though they deny,
/// so audit records never confuse "no privileges" with "directory down".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionCode {
    /// Rule allowed the request
    Granted,
    /// No identity was supplied
    Unauthenticated,
    /// Identity lacks the required role
    MissingRole,
    /// Identity does not own the resource
    NotOwner,
    /// Rule name is not registered
    UnknownRule,
    /// Rule raised a fault
    EvaluationError,
    /// Directory failed or timed out
    DependencyUnavailable,
}

impl DecisionCode {
    /// Reason string carried by decisions with this code
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionCode::Granted => "granted",
            DecisionCode::Unauthenticated => "unauthenticated",
            DecisionCode::MissingRole => "missing_role",
            DecisionCode::NotOwner => "not_owner",
            DecisionCode::UnknownRule => "unknown_rule",
            DecisionCode::EvaluationError => "evaluation_error",
            DecisionCode::DependencyUnavailable => "dependency_unavailable",
        }
    }

    /// Whether this code grants access
    pub fn is_allow(&self) -> bool {
        matches!(self, DecisionCode::Granted)
    }

    /// Whether the code reflects an infrastructure fault rather than policy
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            DecisionCode::EvaluationError | DecisionCode::DependencyUnavailable
        )
    }
}

impl fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision identifier
    pub id: String,

    /// Whether the request is allowed
    pub allowed: bool,

    /// Rule that produced the decision
    pub rule: String,

    /// Short reason (see [`DecisionCode::as_str`])
    pub reason: String,

    /// Structured reason
    pub code: DecisionCode,

    /// Human-readable detail, when there is something to add
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Evaluation timestamp
    pub evaluated_at: DateTime<Utc>,
}

impl Decision {
    /// Create a decision whose allow flag and reason follow `code`
    pub fn new(rule: impl Into<String>, code: DecisionCode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed: code.is_allow(),
            rule: rule.into(),
            reason: code.as_str().to_string(),
            code,
            detail: None,
            evaluated_at: Utc::now(),
        }
    }

    /// Allow decision
    pub fn allow(rule: impl Into<String>) -> Self {
        Self::new(rule, DecisionCode::Granted)
    }

    /// Deny decision
    pub fn deny(rule: impl Into<String>, code: DecisionCode) -> Self {
        debug_assert!(!code.is_allow());
        Self::new(rule, code)
    }

    /// Attach detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether the decision may be reused from the cache
    ///
    /// Fault denials are handed to concurrent waiters but never retained.
    pub fn is_cacheable(&self) -> bool {
        !self.code.is_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let context = RequestContext::new("employee:42")
            .with_attribute("owner_email", "lucas@x.com")
            .with_attribute("sensitivity", "high");

        assert_eq!(context.resource, "employee:42");
        assert_eq!(context.attribute("owner_email"), Some("lucas@x.com"));
        assert_eq!(context.attribute("missing"), None);
    }

    #[test]
    fn test_decision_creation() {
        let decision = Decision::allow("own-profile");
        assert!(decision.allowed);
        assert_eq!(decision.reason, "granted");
        assert_eq!(decision.rule, "own-profile");
        assert!(!decision.id.is_empty());

        let deny = Decision::deny("tech-only", DecisionCode::MissingRole)
            .with_detail("requires ROLE_TECNOLOGIA");
        assert!(!deny.allowed);
        assert_eq!(deny.reason, "missing_role");
        assert_eq!(deny.detail.as_deref(), Some("requires ROLE_TECNOLOGIA"));
    }

    #[test]
    fn test_fault_decisions_not_cacheable() {
        assert!(Decision::allow("r").is_cacheable());
        assert!(Decision::deny("r", DecisionCode::NotOwner).is_cacheable());
        assert!(!Decision::deny("r", DecisionCode::EvaluationError).is_cacheable());
        assert!(!Decision::deny("r", DecisionCode::DependencyUnavailable).is_cacheable());
    }

    #[test]
    fn test_decision_serializes_code_as_snake_case() {
        let decision = Decision::deny("r", DecisionCode::DependencyUnavailable);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["code"], "dependency_unavailable");
        assert_eq!(json["reason"], "dependency_unavailable");
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_identity_serializes_for_audit() {
        let identity = Identity::new("lucas@x.com".to_string(), HashMap::new());
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["subject_email"], "lucas@x.com");
    }
}
