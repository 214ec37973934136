//! Named rule registry
//!
//! Rules are registered once while building the registry and are immutable
//! afterwards. Definitions can also come from a JSON policy document:
//!
//! ```json
//! {
//!   "rules": [
//!     { "name": "tech-reports", "rule": { "role": "ROLE_TECNOLOGIA" } },
//!     { "name": "own-profile", "rule": { "self_ownership": { "attribute": "owner_email" } } },
//!     { "name": "profile-or-hr", "rule": { "any": [
//!         { "self_ownership": { "attribute": "owner_email" } },
//!         { "role": "ROLE_RH" }
//!     ] } }
//!   ]
//! }
//! ```

use super::rule::Rule;
use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Serializable rule definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    /// Role membership
    Role(String),
    /// Subject email equals a context attribute
    SelfOwnership {
        /// Context attribute holding the owner email
        attribute: String,
    },
    /// AND of sub-rules
    All(Vec<RuleSpec>),
    /// OR of sub-rules
    Any(Vec<RuleSpec>),
}

impl TryFrom<RuleSpec> for Rule {
    type Error = AuthzError;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        match spec {
            RuleSpec::Role(token) => Rule::role(&token),
            RuleSpec::SelfOwnership { attribute } => Ok(Rule::owner_attribute(attribute)),
            RuleSpec::All(specs) => Ok(Rule::All(
                specs.into_iter().map(Rule::try_from).collect::<Result<_>>()?,
            )),
            RuleSpec::Any(specs) => Ok(Rule::Any(
                specs.into_iter().map(Rule::try_from).collect::<Result<_>>()?,
            )),
        }
    }
}

/// One named entry of a policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Rule name callers refer to
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rule body
    pub rule: RuleSpec,
}

/// Policy document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Rule definitions
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Registered rule
#[derive(Debug)]
pub struct NamedRule {
    /// Rule name
    pub name: String,
    /// Rule body
    pub rule: Rule,
}

/// Immutable rule registry
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    rules: Arc<HashMap<String, Arc<NamedRule>>>,
}

impl PolicyRegistry {
    /// Start building a registry
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Build a registry from a policy document
    pub fn from_document(document: PolicyDocument) -> Result<Self> {
        document
            .rules
            .into_iter()
            .try_fold(Self::builder(), |builder, definition| {
                builder.register(definition.name, Rule::try_from(definition.rule)?)
            })
            .map(PolicyRegistryBuilder::build)
    }

    /// Parse a JSON policy document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: PolicyDocument = serde_json::from_str(raw)?;
        Self::from_document(document)
    }

    /// Load a JSON policy document from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Look up a rule by name
    pub fn get(&self, name: &str) -> Option<Arc<NamedRule>> {
        self.rules.get(name).cloned()
    }

    /// Look up a rule that must exist
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::RuleNotFound`] for an unregistered name.
    pub fn require(&self, name: &str) -> Result<Arc<NamedRule>> {
        self.get(name)
            .ok_or_else(|| AuthzError::RuleNotFound(name.to_string()))
    }

    /// Registered rule names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builder for [`PolicyRegistry`]
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    rules: HashMap<String, Arc<NamedRule>>,
}

impl PolicyRegistryBuilder {
    /// Register a rule under a unique name
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidRule`] for an empty or duplicate name or
    /// a structurally invalid rule.
    pub fn register(mut self, name: impl Into<String>, rule: Rule) -> Result<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(AuthzError::InvalidRule("rule name cannot be empty".to_string()));
        }
        if self.rules.contains_key(&name) {
            return Err(AuthzError::InvalidRule(format!("duplicate rule name '{}'", name)));
        }
        rule.validate()
            .map_err(|e| AuthzError::InvalidRule(format!("rule '{}': {}", name, e)))?;

        self.rules
            .insert(name.clone(), Arc::new(NamedRule { name, rule }));
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> PolicyRegistry {
        info!("Policy registry built with {} rules", self.rules.len());
        PolicyRegistry {
            rules: Arc::new(self.rules),
        }
    }
}
