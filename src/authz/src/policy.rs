//! Permission rules and their registry
//!
//! A rule is a predicate over an [`crate::Identity`] and a
//! [`crate::RequestContext`]:
//!
//! - [`Rule::Role`]: the identity's derived roles contain a required role
//! - [`Rule::SelfOwnership`]: the identity's email equals the resource owner
//! - [`Rule::All`] / [`Rule::Any`]: short-circuiting AND / OR
//!
//! Rules never mutate shared state while evaluating.

pub mod registry;
pub mod rule;

pub use registry::{NamedRule, PolicyDocument, PolicyRegistry, PolicyRegistryBuilder, RuleDefinition, RuleSpec};
pub use rule::{Outcome, OwnerExtractor, OwnerFn, Rule};
