//! Authorization engine benchmarks
//!
//! Cold evaluation against directories of increasing size, cached
//! decisions, and role derivation alone.

use accessguard_authz::{
    DirectoryRecord, EngineConfig, Identity, InMemoryDirectory, PolicyEngine, PolicyRegistry,
    RequestContext, RoleDeriver, Rule, VerifiedToken,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

const DEPARTMENTS: [&str; 4] = ["Tecnologia", "Financeiro", "Jurídico", "Recursos Humanos"];

fn directory(size: usize) -> InMemoryDirectory {
    InMemoryDirectory::from_records((0..size).map(|i| {
        DirectoryRecord::new(
            format!("user{}@x.com", i),
            DEPARTMENTS[i % DEPARTMENTS.len()],
            "Analista Sênior",
        )
    }))
}

fn registry() -> PolicyRegistry {
    PolicyRegistry::builder()
        .register(
            "tech-or-owner",
            Rule::any(vec![
                Rule::owner_attribute("owner"),
                Rule::role("ROLE_TECNOLOGIA_ANALISTA_SENIOR").unwrap(),
            ]),
        )
        .unwrap()
        .build()
}

fn identity(engine: &PolicyEngine, email: &str) -> Identity {
    engine
        .identify(&VerifiedToken::default().with_claim("email", email))
        .unwrap()
}

fn bench_authorization_check(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("authorization_check");

    for size in [10, 1_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("directory", size), size, |b, &size| {
            let config = EngineConfig {
                enable_cache: false,
                enable_metrics: false,
                ..Default::default()
            };
            let engine =
                PolicyEngine::new(config, registry(), Arc::new(directory(size))).unwrap();
            let who = identity(&engine, "user1@x.com");
            let ctx = RequestContext::new("reports").with_attribute("owner", "user0@x.com");

            b.to_async(&rt).iter(|| async {
                let decision = engine
                    .authorize(Some(black_box(&who)), "tech-or-owner", black_box(&ctx))
                    .await;
                black_box(decision);
            });
        });
    }

    group.finish();
}

fn bench_authorization_with_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("authorization_with_cache", |b| {
        let engine =
            PolicyEngine::new(EngineConfig::default(), registry(), Arc::new(directory(1_000)))
                .unwrap();
        let who = identity(&engine, "user1@x.com");
        let ctx = RequestContext::new("reports").with_attribute("owner", "user0@x.com");

        // Prime the cache
        rt.block_on(async {
            engine.authorize(Some(&who), "tech-or-owner", &ctx).await;
        });

        b.to_async(&rt).iter(|| async {
            let decision = engine
                .authorize(Some(black_box(&who)), "tech-or-owner", black_box(&ctx))
                .await;
            black_box(decision);
        });
    });
}

fn bench_role_derivation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("role_derivation", |b| {
        let deriver = RoleDeriver::new(Arc::new(directory(1_000)));
        let engine =
            PolicyEngine::new(EngineConfig::default(), registry(), Arc::new(directory(1)))
                .unwrap();
        let who = identity(&engine, "user2@x.com");

        b.to_async(&rt).iter(|| async {
            let roles = deriver.derive_roles(black_box(&who)).await;
            black_box(roles);
        });
    });
}

criterion_group!(
    benches,
    bench_authorization_check,
    bench_authorization_with_cache,
    bench_role_derivation
);
criterion_main!(benches);
