//! Role deriver backed by the directory
//!
//! Lookups run under a deadline. Every failure mode collapses to an empty
//! role set; the [`RoleSource`] keeps "nobody here" apart from "directory
//! down" for logs and audit.

use super::directory::DirectoryLookup;
use super::types::Role;
use crate::error::LookupError;
use crate::types::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default directory deadline
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a role set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    /// Derived from a directory record
    Directory,
    /// Directory has no record for the subject
    NotFound,
    /// Directory failed or timed out
    Unavailable,
}

/// Roles derived for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    roles: BTreeSet<Role>,
    source: RoleSource,
    failure: Option<String>,
}

impl RoleSet {
    fn derived(roles: BTreeSet<Role>) -> Self {
        Self {
            roles,
            source: RoleSource::Directory,
            failure: None,
        }
    }

    fn not_found() -> Self {
        Self {
            roles: BTreeSet::new(),
            source: RoleSource::NotFound,
            failure: None,
        }
    }

    fn unavailable(failure: &LookupError) -> Self {
        Self {
            roles: BTreeSet::new(),
            source: RoleSource::Unavailable,
            failure: Some(failure.to_string()),
        }
    }

    /// Membership test
    pub fn contains(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Derived roles, ordered
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Provenance of the set
    pub fn source(&self) -> RoleSource {
        self.source
    }

    /// Lookup failure text when the directory was unavailable
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Number of roles
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no roles were derived
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Resolves an identity's roles through a [`DirectoryLookup`]
///
/// Holds no cache of its own; memoization happens at the decision level so a
/// directory change shows up as soon as cached decisions expire.
#[derive(Clone)]
pub struct RoleDeriver {
    directory: Arc<dyn DirectoryLookup>,
    timeout: Duration,
}

impl RoleDeriver {
    /// Create a deriver with the default deadline
    pub fn new(directory: Arc<dyn DirectoryLookup>) -> Self {
        Self::with_timeout(directory, DEFAULT_DIRECTORY_TIMEOUT)
    }

    /// Create a deriver with a custom deadline
    pub fn with_timeout(directory: Arc<dyn DirectoryLookup>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Directory deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Derive roles for an identity; never fails
    pub async fn derive_roles(&self, identity: &Identity) -> RoleSet {
        let email = identity.subject_email();

        let lookup = tokio::time::timeout(self.timeout, self.directory.lookup(email)).await;

        match lookup {
            Ok(Ok(Some(record))) => {
                let roles = record.derive_roles();
                debug!("Derived {} roles for {}: {:?}", roles.len(), email, roles);
                RoleSet::derived(roles)
            }
            Ok(Ok(None)) => {
                debug!("No directory record for {}", email);
                RoleSet::not_found()
            }
            Ok(Err(e)) => {
                error!("Directory lookup failed for {}: {}", email, e);
                RoleSet::unavailable(&e)
            }
            Err(_) => {
                let e = LookupError::Timeout(self.timeout);
                error!("Directory lookup failed for {}: {}", email, e);
                RoleSet::unavailable(&e)
            }
        }
    }
}
