//! Role and directory record types

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Prefix carried by every role token
pub const ROLE_PREFIX: &str = "ROLE_";

/// Directory entry for one person
///
/// Owned by the external directory; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Email the record is keyed by
    pub email: String,

    /// Organizational department (e.g., "Tecnologia")
    #[serde(default)]
    pub department: Option<String>,

    /// Job title within the department (e.g., "Analista")
    #[serde(default)]
    pub title: Option<String>,
}

impl DirectoryRecord {
    /// Create a record with department and title
    pub fn new(
        email: impl Into<String>,
        department: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            department: Some(department.into()),
            title: Some(title.into()),
        }
    }

    /// Create a record with a department only
    pub fn department_only(email: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            department: Some(department.into()),
            title: None,
        }
    }

    /// Roles implied by this record
    ///
    /// `ROLE_{DEPT}` when the department is usable, plus `ROLE_{DEPT}_{TITLE}`
    /// when the title is usable too. A title without a department grants
    /// nothing. Same record, same set.
    pub fn derive_roles(&self) -> BTreeSet<Role> {
        let mut roles = BTreeSet::new();

        let Some(department) = self.department.as_deref().and_then(sanitize_segment) else {
            return roles;
        };

        if let Some(title) = self.title.as_deref().and_then(sanitize_segment) {
            roles.insert(Role(format!("{ROLE_PREFIX}{department}_{title}")));
        }
        roles.insert(Role(format!("{ROLE_PREFIX}{department}")));

        roles
    }
}

/// Canonicalize one directory value into a role segment
///
/// Accents are stripped through NFD decomposition, letters are uppercased,
/// every run of other characters becomes a single `_`, and separators at the
/// edges are dropped. Returns `None` when nothing usable remains.
pub fn sanitize_segment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut separator_pending = false;

    for c in raw.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if separator_pending && !out.is_empty() {
                out.push('_');
            }
            separator_pending = false;
            out.push(c.to_ascii_uppercase());
        } else {
            separator_pending = true;
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Derived authorization token, `ROLE_` followed by `[A-Z0-9_]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    /// Parse a role token, rejecting anything derivation could never produce
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidRule`] for a missing `ROLE_` prefix, an
    /// empty body, or characters outside `[A-Z0-9_]`.
    pub fn parse(token: &str) -> Result<Self> {
        let Some(body) = token.strip_prefix(ROLE_PREFIX) else {
            return Err(AuthzError::InvalidRule(format!(
                "role '{}' must start with {}",
                token, ROLE_PREFIX
            )));
        };

        let well_formed = !body.is_empty()
            && !body.starts_with('_')
            && !body.ends_with('_')
            && !body.contains("__")
            && body
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

        if !well_formed {
            return Err(AuthzError::InvalidRule(format!(
                "role '{}' must be {}[A-Z0-9_] with single inner separators",
                token, ROLE_PREFIX
            )));
        }

        Ok(Self(token.to_string()))
    }

    /// Department-level role for a raw department name
    pub fn for_department(department: &str) -> Option<Self> {
        sanitize_segment(department).map(|d| Self(format!("{ROLE_PREFIX}{d}")))
    }

    /// Role token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Role {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self> {
        Role::parse(&value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}
