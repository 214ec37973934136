//! Policy engine integration tests
//!
//! End-to-end authorization through claims, directory, rules, cache and
//! audit.

use accessguard_authz::{
    audit::AuditRecord, AuditError, AuditSink, DecisionCode, DirectoryLookup, DirectoryRecord,
    EngineConfig, Identity, InMemoryDirectory, LookupError, MemoryAuditSink, PolicyEngine,
    PolicyRegistry, RequestContext, RoleSource, Rule, VerifiedToken,
};
use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// FIXTURES
// ============================================================================

fn people() -> InMemoryDirectory {
    InMemoryDirectory::from_records(vec![
        DirectoryRecord::new("leonardo@x.com", "Tecnologia", "Analista"),
        DirectoryRecord::new("lucas@x.com", "Financeiro", "Gerente"),
        DirectoryRecord::department_only("ana@x.com", "tecnologia"),
    ])
}

fn registry() -> PolicyRegistry {
    PolicyRegistry::builder()
        .register("own-profile", Rule::owner_attribute("owner"))
        .unwrap()
        .register("tech-area", Rule::role("ROLE_TECNOLOGIA").unwrap())
        .unwrap()
        .register("tech-analyst", Rule::role("ROLE_TECNOLOGIA_ANALISTA").unwrap())
        .unwrap()
        .register(
            "own-or-finance",
            Rule::any(vec![
                Rule::owner_attribute("owner"),
                Rule::role("ROLE_FINANCEIRO").unwrap(),
            ]),
        )
        .unwrap()
        .build()
}

fn engine_with(directory: Arc<dyn DirectoryLookup>, config: EngineConfig) -> PolicyEngine {
    PolicyEngine::new(config, registry(), directory).unwrap()
}

fn engine() -> PolicyEngine {
    engine_with(Arc::new(people()), EngineConfig::default())
}

fn identity(engine: &PolicyEngine, email: &str) -> Identity {
    engine
        .identify(&VerifiedToken::default().with_claim("email", email))
        .unwrap()
}

fn owned_by(owner: &str) -> RequestContext {
    RequestContext::new(format!("profile/{}", owner)).with_attribute("owner", owner)
}

struct DownDirectory;

#[async_trait]
impl DirectoryLookup for DownDirectory {
    async fn lookup(&self, _email: &str) -> Result<Option<DirectoryRecord>, LookupError> {
        Err(LookupError::Status(503))
    }
}

struct StalledDirectory;

#[async_trait]
impl DirectoryLookup for StalledDirectory {
    async fn lookup(&self, _email: &str) -> Result<Option<DirectoryRecord>, LookupError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }
}

struct BrokenSink;

#[async_trait]
impl AuditSink for BrokenSink {
    async fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Sink("audit store unreachable".to_string()))
    }
}

// ============================================================================
// SELF-OWNERSHIP
// ============================================================================

#[tokio::test]
async fn test_leonardo_cannot_read_lucas_profile() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "own-profile", &owned_by("lucas@x.com"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.code, DecisionCode::NotOwner);
}

#[tokio::test]
async fn test_leonardo_reads_own_profile() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "own-profile", &owned_by("leonardo@x.com"))
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.reason, "granted");
    assert_eq!(decision.rule, "own-profile");
}

#[tokio::test]
async fn test_cached_allow_does_not_leak_to_other_owner() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let mine = RequestContext::new("profile").with_attribute("owner", "leonardo@x.com");
    let lucas_owned = RequestContext::new("profile").with_attribute("owner", "lucas@x.com");

    assert!(engine.authorize(Some(&leonardo), "own-profile", &mine).await.allowed);

    let decision = engine.authorize(Some(&leonardo), "own-profile", &lucas_owned).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "not_owner");

    // The original context is still served from the cache
    assert!(engine.authorize(Some(&leonardo), "own-profile", &mine).await.allowed);
    assert_eq!(engine.cache_stats().unwrap().hits, 1);
}

#[tokio::test]
async fn test_ownership_is_case_sensitive() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "own-profile", &owned_by("Leonardo@x.com"))
        .await;

    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_missing_owner_attribute_is_evaluation_error() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "own-profile", &RequestContext::new("profile/unknown"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "evaluation_error");
}

// ============================================================================
// UNAUTHENTICATED
// ============================================================================

#[tokio::test]
async fn test_unauthenticated_never_invokes_rule() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let registry = PolicyRegistry::builder()
        .register(
            "counted",
            Rule::owner_with(move |ctx: &RequestContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ctx.resource.clone())
            }),
        )
        .unwrap()
        .build();
    let engine = PolicyEngine::new(EngineConfig::default(), registry, Arc::new(people())).unwrap();

    for rule in ["counted", "does-not-exist"] {
        let decision = engine.authorize(None, rule, &RequestContext::new("x")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "unauthenticated");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// ROLE MEMBERSHIP
// ============================================================================

#[tokio::test]
async fn test_tecnologia_allowed_financeiro_denied() {
    let engine = engine();
    let ctx = RequestContext::new("reports/infra");

    let leonardo = identity(&engine, "leonardo@x.com");
    let lucas = identity(&engine, "lucas@x.com");
    let ana = identity(&engine, "ana@x.com");

    assert!(engine.authorize(Some(&leonardo), "tech-area", &ctx).await.allowed);
    assert!(engine.authorize(Some(&ana), "tech-area", &ctx).await.allowed);

    let denied = engine.authorize(Some(&lucas), "tech-area", &ctx).await;
    assert!(!denied.allowed);
    assert_eq!(denied.code, DecisionCode::MissingRole);
}

#[tokio::test]
async fn test_title_role_requires_title() {
    let engine = engine();
    let ctx = RequestContext::new("reports/infra");

    let leonardo = identity(&engine, "leonardo@x.com");
    let ana = identity(&engine, "ana@x.com");

    assert!(engine.authorize(Some(&leonardo), "tech-analyst", &ctx).await.allowed);
    assert!(!engine.authorize(Some(&ana), "tech-analyst", &ctx).await.allowed);
}

#[tokio::test]
async fn test_unknown_person_has_no_roles() {
    let engine = engine();
    let stranger = identity(&engine, "stranger@x.com");

    let decision = engine
        .authorize(Some(&stranger), "tech-area", &RequestContext::new("reports"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.code, DecisionCode::MissingRole);
}

#[tokio::test]
async fn test_directory_outage_is_dependency_unavailable() {
    let engine = engine_with(Arc::new(DownDirectory), EngineConfig::default());
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "tech-area", &RequestContext::new("reports"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "dependency_unavailable");
}

#[tokio::test]
async fn test_stalled_directory_denies_within_deadline() {
    let config = EngineConfig {
        directory_timeout_ms: 50,
        ..Default::default()
    };
    let engine = engine_with(Arc::new(StalledDirectory), config);
    let leonardo = identity(&engine, "leonardo@x.com");

    let start = Instant::now();
    let decision = engine
        .authorize(Some(&leonardo), "tech-area", &RequestContext::new("reports"))
        .await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(decision.code, DecisionCode::DependencyUnavailable);
}

#[tokio::test]
async fn test_outage_denials_are_not_cached() {
    let engine = engine_with(Arc::new(DownDirectory), EngineConfig::default());
    let leonardo = identity(&engine, "leonardo@x.com");
    let ctx = RequestContext::new("reports");

    engine.authorize(Some(&leonardo), "tech-area", &ctx).await;
    engine.authorize(Some(&leonardo), "tech-area", &ctx).await;

    let stats = engine.cache_stats().unwrap();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries, 0);
}

// ============================================================================
// COMPOSITES
// ============================================================================

#[tokio::test]
async fn test_or_rule_allows_owner_or_finance() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");
    let lucas = identity(&engine, "lucas@x.com");

    let anas_profile = owned_by("ana@x.com");

    assert!(!engine.authorize(Some(&leonardo), "own-or-finance", &anas_profile).await.allowed);
    assert!(engine.authorize(Some(&lucas), "own-or-finance", &anas_profile).await.allowed);
    assert!(
        engine
            .authorize(Some(&leonardo), "own-or-finance", &owned_by("leonardo@x.com"))
            .await
            .allowed
    );
}

// ============================================================================
// UNKNOWN RULES, AUDIT
// ============================================================================

#[tokio::test]
async fn test_unknown_rule_denies() {
    let engine = engine();
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "delete-everything", &RequestContext::new("*"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "unknown_rule");
}

#[tokio::test]
async fn test_audit_failure_does_not_change_decision() {
    let engine = engine().with_audit_sink(Arc::new(BrokenSink));
    let leonardo = identity(&engine, "leonardo@x.com");

    let decision = engine
        .authorize(Some(&leonardo), "own-profile", &owned_by("leonardo@x.com"))
        .await;

    assert!(decision.allowed);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_audit_trail_records_every_decision() {
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = engine().with_audit_sink(sink.clone());
    let leonardo = identity(&engine, "leonardo@x.com");
    let ctx = RequestContext::new("reports");

    engine.authorize(Some(&leonardo), "tech-area", &ctx).await;
    engine.authorize(Some(&leonardo), "tech-area", &ctx).await;
    engine.authorize(None, "tech-area", &ctx).await;
    engine.shutdown().await;

    let records = sink.records().await;
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].role_source, Some(RoleSource::Directory));
    assert!(!records[0].cache_hit);
    assert!(records[1].cache_hit);
    assert_eq!(records[1].decision.id, records[0].decision.id);
    assert_eq!(records[2].subject, None);
    assert_eq!(records[2].decision.code, DecisionCode::Unauthenticated);

    let leonardo_records = sink.query_by_subject("leonardo@x.com", 10).await;
    assert_eq!(leonardo_records.len(), 2);
}

#[tokio::test]
async fn test_rules_from_json_policy() {
    let registry = PolicyRegistry::from_json_str(
        r#"{
            "rules": [
                { "name": "own-profile", "rule": { "self_ownership": { "attribute": "owner" } } },
                { "name": "tech", "rule": { "role": "ROLE_TECNOLOGIA" } }
            ]
        }"#,
    )
    .unwrap();
    let engine = PolicyEngine::new(EngineConfig::default(), registry, Arc::new(people())).unwrap();
    let leonardo = identity(&engine, "leonardo@x.com");

    assert!(engine.authorize(Some(&leonardo), "tech", &RequestContext::new("r")).await.allowed);
    assert!(
        engine
            .authorize(Some(&leonardo), "own-profile", &owned_by("leonardo@x.com"))
            .await
            .allowed
    );
}

// ============================================================================
// CONCURRENT ACCESS
// ============================================================================

#[tokio::test]
async fn test_concurrent_authorization_requests() {
    let engine = Arc::new(engine());

    let mut handles = vec![];
    for i in 0..100 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let email = if i % 2 == 0 { "leonardo@x.com" } else { "lucas@x.com" };
            let who = identity(&engine, email);
            engine
                .authorize(Some(&who), "tech-area", &RequestContext::new("reports"))
                .await
                .allowed
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 50);
}

// ============================================================================
// PROPERTY-BASED TESTS (PROPTEST)
// ============================================================================

proptest! {
    #[test]
    fn test_distinct_emails_never_own(
        a in "[a-z]{1,10}@[a-z]{1,8}\\.com",
        b in "[a-z]{1,10}@[a-z]{1,8}\\.com",
    ) {
        prop_assume!(a != b);
        tokio_test::block_on(async {
            let engine = engine();
            let who = identity(&engine, &a);
            let decision = engine.authorize(Some(&who), "own-profile", &owned_by(&b)).await;
            assert!(!decision.allowed);
        });
    }

    #[test]
    fn test_same_email_always_owns(email in "[A-Za-z0-9._]{1,12}@[a-z]{1,8}\\.[a-z]{2,4}") {
        tokio_test::block_on(async {
            let engine = engine();
            let who = identity(&engine, &email);
            let decision = engine.authorize(Some(&who), "own-profile", &owned_by(&email)).await;
            assert!(decision.allowed);
        });
    }
}
