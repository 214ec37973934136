//! In-process decision metrics

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::cache::CacheLookup;
use crate::types::DecisionCode;

/// Engine counters
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of authorization requests
    pub total_requests: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Requests without an identity
    pub unauthenticated: u64,

    /// Denials caused by evaluation errors or unavailable dependencies
    pub fault_denials: u64,

    /// Cache hits
    pub cache_hits: u64,

    /// Cache misses
    pub cache_misses: u64,

    /// Requests that joined an in-flight computation
    pub cache_coalesced: u64,

    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Metrics collector
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    /// Record how the cache answered
    pub async fn record_cache(&self, lookup: CacheLookup) {
        let mut metrics = self.metrics.write().await;
        match lookup {
            CacheLookup::Hit => metrics.cache_hits += 1,
            CacheLookup::Computed => metrics.cache_misses += 1,
            CacheLookup::Coalesced => metrics.cache_coalesced += 1,
        }
    }

    /// Record an authorization decision
    pub async fn record_decision(&self, code: DecisionCode) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        if code.is_allow() {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
        }
        if code == DecisionCode::Unauthenticated {
            metrics.unauthenticated += 1;
        }
        if code.is_fault() {
            metrics.fault_denials += 1;
        }
    }

    /// Record request latency
    ///
    /// Only the sample buffer is locked; percentiles are derived on read.
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut snapshot = self.metrics.read().await.clone();

        let mut sorted = self.latency_samples.read().await.clone();
        if sorted.is_empty() {
            return snapshot;
        }
        sorted.sort_by(f64::total_cmp);

        snapshot.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        snapshot.latency_p50_ms = Self::percentile(&sorted, 0.50);
        snapshot.latency_p99_ms = Self::percentile(&sorted, 0.99);
        snapshot
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
