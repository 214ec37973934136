//! Role derivation module
//!
//! Turns an identity into hierarchical role tokens using the organizational
//! directory: a department-level role plus a narrower department+title role.
//!
//! # Example
//!
//! ```rust
//! use accessguard_authz::claims::{ClaimsExtractor, VerifiedToken};
//! use accessguard_authz::roles::{DirectoryRecord, InMemoryDirectory, Role, RoleDeriver};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = InMemoryDirectory::from_records([
//!     DirectoryRecord::new("leonardo@x.com", "Tecnologia", "Analista"),
//! ]);
//! let deriver = RoleDeriver::new(Arc::new(directory));
//!
//! let token = VerifiedToken::default().with_claim("email", "leonardo@x.com");
//! let identity = ClaimsExtractor::default().extract(&token)?;
//!
//! let roles = deriver.derive_roles(&identity).await;
//! assert!(roles.contains(&Role::parse("ROLE_TECNOLOGIA")?));
//! assert!(roles.contains(&Role::parse("ROLE_TECNOLOGIA_ANALISTA")?));
//! # Ok(())
//! # }
//! ```

pub mod deriver;
pub mod directory;
pub mod types;


pub use deriver::{RoleDeriver, RoleSet, RoleSource, DEFAULT_DIRECTORY_TIMEOUT};
pub use directory::{DirectoryLookup, InMemoryDirectory};
pub use types::{sanitize_segment, DirectoryRecord, Role, ROLE_PREFIX};
