//! Policy engine
//!
//! Resolves a named rule, evaluates it for an identity and request context,
//! and returns a [`Decision`]. Every failure along the way turns into a
//! denial, so [`PolicyEngine::authorize`] never returns an error.

pub mod cache;
pub mod metrics;

pub use cache::{AccessDecisionCache, CacheConfig, CacheLookup, CacheStats};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::audit::{AuditDispatcher, AuditRecord, AuditSink};
use crate::claims::{ClaimsExtractor, VerifiedToken};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::policy::{NamedRule, PolicyRegistry};
use crate::roles::{DirectoryLookup, RoleDeriver, RoleSource};
use crate::types::{Decision, DecisionCode, Identity, RequestContext};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Main policy engine
///
/// # Architecture
///
/// ```text
/// Identity → Registry → [Cache] → Rule → RoleDeriver → Directory
///                          ↓        ↓
///                      Decision ← Outcome
///                          ↓
///                 [Audit]    [Metrics]
/// ```
pub struct PolicyEngine {
    /// Named rules
    registry: PolicyRegistry,

    /// Role derivation against the directory
    deriver: RoleDeriver,

    /// Single-flight decision cache
    cache: Option<Arc<AccessDecisionCache>>,

    /// Fire-and-forget audit channel
    audit: Option<AuditDispatcher>,

    /// In-process counters
    metrics: Option<Arc<MetricsCollector>>,

    /// Token normalization
    claims: ClaimsExtractor,

    config: EngineConfig,
}

impl PolicyEngine {
    /// Create an engine over a registry and a directory
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthzError::Config`] when `config` does not validate.
    pub fn new(
        config: EngineConfig,
        registry: PolicyRegistry,
        directory: Arc<dyn DirectoryLookup>,
    ) -> Result<Self> {
        config.validate()?;

        let deriver = RoleDeriver::with_timeout(directory, config.directory_timeout());

        let cache = if config.enable_cache {
            Some(Arc::new(AccessDecisionCache::new(config.cache_config())))
        } else {
            None
        };

        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            "PolicyEngine initialized with {} rules, cache={}, metrics={}",
            registry.len(),
            config.enable_cache,
            config.enable_metrics
        );

        Ok(Self {
            registry,
            deriver,
            cache,
            audit: None,
            metrics,
            claims: ClaimsExtractor::new(config.claims_config()),
            config,
        })
    }

    /// Send every decision to `sink`
    ///
    /// Spawns the audit drain task, so it must run inside a tokio runtime.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(AuditDispatcher::spawn(
            sink,
            self.config.audit_buffer,
            self.config.audit_timeout(),
        ));
        self
    }

    /// Build an identity from verified token claims
    pub fn identify(&self, token: &VerifiedToken) -> Result<Identity> {
        self.claims.extract(token)
    }

    /// Decide whether `identity` may pass `rule_name` for `context`
    ///
    /// # Pipeline
    ///
    /// 1. No identity: deny as unauthenticated, rule not evaluated
    /// 2. Unknown rule: deny
    /// 3. Cached decision, or evaluate the rule once per key
    /// 4. Record metrics and emit the audit record
    pub async fn authorize(
        &self,
        identity: Option<&Identity>,
        rule_name: &str,
        context: &RequestContext,
    ) -> Decision {
        let start = Instant::now();

        let Some(identity) = identity else {
            debug!("No identity for rule {}, denying", rule_name);
            let decision = Decision::deny(rule_name, DecisionCode::Unauthenticated);
            return self
                .finalize(None, context, decision, None, CacheLookup::Computed, start)
                .await;
        };

        debug!(
            "Authorization request: subject={}, rule={}, resource={}",
            identity.subject_email(),
            rule_name,
            context.resource
        );

        let Some(named) = self.registry.get(rule_name) else {
            warn!("Unknown rule requested: {}", rule_name);
            let decision = Decision::deny(rule_name, DecisionCode::UnknownRule);
            return self
                .finalize(Some(identity), context, decision, None, CacheLookup::Computed, start)
                .await;
        };

        let (decision, role_source, lookup) = match &self.cache {
            Some(cache) => {
                let resource_key = decision_key(rule_name, context);
                let named = &named;
                cache
                    .lookup_or_evaluate(identity, &resource_key, move || {
                        self.evaluate_rule(named, identity, context)
                    })
                    .await
            }
            None => {
                let (decision, role_source) = self.evaluate_rule(&named, identity, context).await;
                (decision, role_source, CacheLookup::Computed)
            }
        };

        self.finalize(Some(identity), context, decision, role_source, lookup, start)
            .await
    }

    /// Drop every cached decision
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("Decision cache invalidated");
        }
    }

    /// Get engine metrics
    pub async fn get_metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Audit records dropped because the channel was full
    pub fn audit_dropped(&self) -> u64 {
        self.audit.as_ref().map(AuditDispatcher::dropped).unwrap_or(0)
    }

    /// Flush pending audit records and stop the audit task
    pub async fn shutdown(self) {
        if let Some(audit) = self.audit {
            audit.close().await;
        }
        info!("PolicyEngine shut down");
    }

    /// Registered rules
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn evaluate_rule(
        &self,
        named: &NamedRule,
        identity: &Identity,
        context: &RequestContext,
    ) -> (Decision, Option<RoleSource>) {
        let evaluation = named.rule.evaluate(identity, context, &self.deriver);

        match AssertUnwindSafe(evaluation).catch_unwind().await {
            Ok(outcome) => {
                let mut decision = Decision::new(named.name.as_str(), outcome.code);
                if let Some(detail) = outcome.detail {
                    decision = decision.with_detail(detail);
                }
                (decision, outcome.role_source)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Rule {} panicked: {}", named.name, message);
                let decision = Decision::deny(named.name.as_str(), DecisionCode::EvaluationError)
                    .with_detail(format!("rule panicked: {}", message));
                (decision, None)
            }
        }
    }

    async fn finalize(
        &self,
        identity: Option<&Identity>,
        context: &RequestContext,
        decision: Decision,
        role_source: Option<RoleSource>,
        lookup: CacheLookup,
        start: Instant,
    ) -> Decision {
        let elapsed = start.elapsed();

        if let Some(metrics) = &self.metrics {
            if self.cache.is_some() && identity.is_some() && decision.code != DecisionCode::UnknownRule {
                metrics.record_cache(lookup).await;
            }
            metrics.record_decision(decision.code).await;
            metrics.record_latency(elapsed).await;
        }

        debug!(
            "Decision: {} for rule {} ({}, {:?})",
            if decision.allowed { "ALLOW" } else { "DENY" },
            decision.rule,
            decision.reason,
            lookup
        );

        if let Some(audit) = &self.audit {
            audit.emit(AuditRecord {
                subject: identity.map(|i| i.subject_email().to_string()),
                rule: decision.rule.clone(),
                resource: context.resource.clone(),
                decision: decision.clone(),
                role_source,
                cache_hit: lookup == CacheLookup::Hit,
                latency_ms: elapsed.as_millis() as u64,
            });
        }

        decision
    }
}

/// Cache key for one rule over one full request context
///
/// Every field is length-prefixed and attributes are hashed in key order, so
/// no two distinct (rule, resource, attributes) triples share a key.
fn decision_key(rule_name: &str, context: &RequestContext) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut write = |field: &str| {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    };

    write(rule_name);
    write(&context.resource);

    let mut attributes: Vec<(&String, &String)> = context.attributes.iter().collect();
    attributes.sort();
    for (key, value) in attributes {
        write(key);
        write(value);
    }

    hasher.finalize().to_hex().to_string()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
