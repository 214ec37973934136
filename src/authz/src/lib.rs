//! # AccessGuard Authorization Engine
//!
//! Decides whether an authenticated identity may perform an operation.
//!
//! ## Features
//!
//! - **Claims normalization** from verified identity-provider tokens
//! - **Role derivation** from an organizational directory, sanitized into
//!   stable `ROLE_*` tokens
//! - **Composable rules**: role membership, self-ownership, AND / OR
//! - **Single-flight decision cache** with TTL expiry
//! - **Fail-closed**: every fault becomes a denial with a distinct reason
//! - **Asynchronous audit trail** that never delays a decision
//!
//! ## Example
//!
//! ```rust
//! use accessguard_authz::{
//!     DirectoryRecord, EngineConfig, InMemoryDirectory, PolicyEngine, PolicyRegistry,
//!     RequestContext, Rule, VerifiedToken,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = PolicyRegistry::builder()
//!         .register("tech-area", Rule::role("ROLE_TECNOLOGIA")?)?
//!         .build();
//!     let directory = InMemoryDirectory::from_records(vec![DirectoryRecord::new(
//!         "leonardo@x.com",
//!         "Tecnologia",
//!         "Analista",
//!     )]);
//!
//!     let engine = PolicyEngine::new(EngineConfig::default(), registry, Arc::new(directory))?;
//!
//!     let token = VerifiedToken::default().with_claim("email", "leonardo@x.com");
//!     let identity = engine.identify(&token)?;
//!
//!     let decision = engine
//!         .authorize(Some(&identity), "tech-area", &RequestContext::new("reports"))
//!         .await;
//!
//!     if decision.allowed {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod roles;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use claims::{ClaimsConfig, ClaimsExtractor, VerifiedToken};
pub use config::EngineConfig;
pub use engine::{AccessDecisionCache, CacheConfig, CacheStats, EngineMetrics, PolicyEngine};
pub use error::{AuditError, AuthzError, LookupError, Result};
pub use policy::{PolicyRegistry, Rule, RuleSpec};
pub use roles::{DirectoryLookup, DirectoryRecord, InMemoryDirectory, Role, RoleDeriver, RoleSet, RoleSource};
pub use types::{Decision, DecisionCode, Identity, RequestContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
