//! Rule expressions and their evaluation

use crate::error::{AuthzError, Result};
use crate::roles::{Role, RoleDeriver, RoleSet, RoleSource};
use crate::types::{DecisionCode, Identity, RequestContext};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// Closure resolving the owner email of a resource from the request context
pub type OwnerFn = dyn Fn(&RequestContext) -> Result<String> + Send + Sync;

/// How a self-ownership rule finds the resource owner
#[derive(Clone)]
pub enum OwnerExtractor {
    /// Read a context attribute
    Attribute(String),
    /// Compute from the context
    Custom(Arc<OwnerFn>),
}

impl OwnerExtractor {
    fn owner_email(&self, context: &RequestContext) -> Result<String> {
        match self {
            OwnerExtractor::Attribute(key) => context
                .attribute(key)
                .map(str::to_string)
                .ok_or_else(|| {
                    AuthzError::EvaluationError(format!(
                        "context attribute '{}' is missing for resource '{}'",
                        key, context.resource
                    ))
                }),
            OwnerExtractor::Custom(extract) => extract(context),
        }
    }
}

impl fmt::Debug for OwnerExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerExtractor::Attribute(key) => f.debug_tuple("Attribute").field(key).finish(),
            OwnerExtractor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Composable permission predicate over (identity, context)
#[derive(Debug, Clone)]
pub enum Rule {
    /// Identity must hold the role
    Role(Role),
    /// Identity email must equal the resource owner email, byte for byte
    SelfOwnership(OwnerExtractor),
    /// Every sub-rule must allow; stops at the first denial
    All(Vec<Rule>),
    /// Some sub-rule must allow; stops at the first allow
    Any(Vec<Rule>),
}

impl Rule {
    /// Role membership rule
    pub fn role(token: &str) -> Result<Self> {
        Ok(Rule::Role(Role::parse(token)?))
    }

    /// Self-ownership rule reading the owner from a context attribute
    pub fn owner_attribute(key: impl Into<String>) -> Self {
        Rule::SelfOwnership(OwnerExtractor::Attribute(key.into()))
    }

    /// Self-ownership rule with a custom owner extractor
    pub fn owner_with<F>(extract: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<String> + Send + Sync + 'static,
    {
        Rule::SelfOwnership(OwnerExtractor::Custom(Arc::new(extract)))
    }

    /// AND composite
    pub fn all(rules: Vec<Rule>) -> Self {
        Rule::All(rules)
    }

    /// OR composite
    pub fn any(rules: Vec<Rule>) -> Self {
        Rule::Any(rules)
    }

    /// Reject structurally empty definitions
    pub fn validate(&self) -> Result<()> {
        match self {
            Rule::Role(_) => Ok(()),
            Rule::SelfOwnership(OwnerExtractor::Attribute(key)) if key.is_empty() => Err(
                AuthzError::InvalidRule("self-ownership attribute cannot be empty".to_string()),
            ),
            Rule::SelfOwnership(_) => Ok(()),
            Rule::All(rules) | Rule::Any(rules) => {
                if rules.is_empty() {
                    return Err(AuthzError::InvalidRule(
                        "composite rule needs at least one sub-rule".to_string(),
                    ));
                }
                rules.iter().try_for_each(Rule::validate)
            }
        }
    }

    /// Evaluate against an identity, deriving roles at most once
    ///
    /// Errors raised inside the rule come back as an
    /// [`DecisionCode::EvaluationError`] outcome.
    pub async fn evaluate(
        &self,
        identity: &Identity,
        context: &RequestContext,
        deriver: &RoleDeriver,
    ) -> Outcome {
        let scope = EvalScope {
            identity,
            context,
            deriver,
            roles: OnceCell::new(),
        };

        let mut outcome = self.eval_guarded(&scope).await;
        outcome.role_source = scope.roles.get().map(RoleSet::source);
        outcome
    }

    fn eval_guarded<'a>(&'a self, scope: &'a EvalScope<'a>) -> BoxFuture<'a, Outcome> {
        async move {
            match self.eval(scope).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        "Rule evaluation error for {} on '{}': {}",
                        scope.identity.subject_email(),
                        scope.context.resource,
                        e
                    );
                    Outcome::new(DecisionCode::EvaluationError).with_detail(e.to_string())
                }
            }
        }
        .boxed()
    }

    fn eval<'a>(&'a self, scope: &'a EvalScope<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            match self {
                Rule::Role(required) => {
                    let roles = scope.roles().await;
                    if roles.contains(required) {
                        return Ok(Outcome::new(DecisionCode::Granted));
                    }
                    if roles.source() == RoleSource::Unavailable {
                        return Ok(Outcome::new(DecisionCode::DependencyUnavailable)
                            .with_detail(roles.failure().unwrap_or("directory unavailable")));
                    }
                    Ok(Outcome::new(DecisionCode::MissingRole)
                        .with_detail(format!("requires {}", required)))
                }

                Rule::SelfOwnership(extractor) => {
                    let owner = extractor.owner_email(scope.context)?;
                    // Exact equality: "Lucas@x.com" does not own "lucas@x.com".
                    if scope.identity.subject_email() == owner {
                        Ok(Outcome::new(DecisionCode::Granted))
                    } else {
                        Ok(Outcome::new(DecisionCode::NotOwner))
                    }
                }

                Rule::All(rules) => {
                    if rules.is_empty() {
                        return Err(AuthzError::EvaluationError("empty AND rule".to_string()));
                    }
                    for rule in rules {
                        let outcome = rule.eval_guarded(scope).await;
                        if !outcome.is_allowed() {
                            debug!("AND short-circuit on {}", outcome.code);
                            return Ok(outcome);
                        }
                    }
                    Ok(Outcome::new(DecisionCode::Granted))
                }

                Rule::Any(rules) => {
                    let mut first_fault: Option<Outcome> = None;
                    let mut last_denial: Option<Outcome> = None;

                    for rule in rules {
                        let outcome = rule.eval_guarded(scope).await;
                        if outcome.is_allowed() {
                            debug!("OR short-circuit on allow");
                            return Ok(outcome);
                        }
                        if outcome.code.is_fault() && first_fault.is_none() {
                            first_fault = Some(outcome);
                        } else {
                            last_denial = Some(outcome);
                        }
                    }

                    first_fault
                        .or(last_denial)
                        .ok_or_else(|| AuthzError::EvaluationError("empty OR rule".to_string()))
                }
            }
        }
        .boxed()
    }
}

/// Per-evaluation state
struct EvalScope<'a> {
    identity: &'a Identity,
    context: &'a RequestContext,
    deriver: &'a RoleDeriver,
    roles: OnceCell<RoleSet>,
}

impl EvalScope<'_> {
    async fn roles(&self) -> &RoleSet {
        self.roles
            .get_or_init(|| self.deriver.derive_roles(self.identity))
            .await
    }
}

/// Result of evaluating a rule, before it becomes a [`crate::Decision`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Structured result
    pub code: DecisionCode,
    /// Optional explanation
    pub detail: Option<String>,
    /// Provenance of roles, if any role rule ran
    pub role_source: Option<RoleSource>,
}

impl Outcome {
    fn new(code: DecisionCode) -> Self {
        Self {
            code,
            detail: None,
            role_source: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether the outcome allows
    pub fn is_allowed(&self) -> bool {
        self.code.is_allow()
    }
}
