//! Audit trail for authorization decisions
//!
//! The engine hands every decision to an [`AuditSink`] without waiting for
//! it: records go through a bounded channel drained by a background task.
//! A full channel drops the record, a failing or slow sink is logged, and
//! neither ever changes or delays the decision.

use crate::error::AuditError;
use crate::roles::RoleSource;
use crate::types::Decision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of records the dispatcher buffers
pub const DEFAULT_AUDIT_BUFFER: usize = 1_024;

/// Default deadline for a sink to accept one record
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Subject email, absent for unauthenticated requests
    pub subject: Option<String>,

    /// Rule that was requested
    pub rule: String,

    /// Resource that was requested
    pub resource: String,

    /// Decision returned to the caller
    pub decision: Decision,

    /// Provenance of roles, when a role rule ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_source: Option<RoleSource>,

    /// Whether the decision came from the cache
    pub cache_hit: bool,

    /// Time spent producing the decision (milliseconds)
    pub latency_ms: u64,
}

/// Receiver of decision records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Store or forward one record
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Sink that writes records as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let subject = record.subject.as_deref().unwrap_or("-");
        if record.decision.code.is_fault() {
            warn!(
                target: "accessguard::audit",
                subject,
                rule = %record.rule,
                resource = %record.resource,
                allowed = record.decision.allowed,
                reason = %record.decision.reason,
                detail = record.decision.detail.as_deref().unwrap_or(""),
                "authorization degraded to denial"
            );
        } else {
            info!(
                target: "accessguard::audit",
                subject,
                rule = %record.rule,
                resource = %record.resource,
                allowed = record.decision.allowed,
                reason = %record.decision.reason,
                cache_hit = record.cache_hit,
                latency_ms = record.latency_ms,
                "authorization decision"
            );
        }
        Ok(())
    }
}

/// Bounded in-memory sink
pub struct MemoryAuditSink {
    buffer: Arc<RwLock<VecDeque<AuditRecord>>>,
    capacity: usize,
}

impl MemoryAuditSink {
    /// Create a sink keeping the most recent 10,000 records
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Create a sink keeping the most recent `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// All retained records, oldest first
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.buffer.read().await.iter().cloned().collect()
    }

    /// Most recent records for a subject, newest first
    pub async fn query_by_subject(&self, subject: &str, limit: usize) -> Vec<AuditRecord> {
        let buffer = self.buffer.read().await;

        buffer
            .iter()
            .rev()
            .filter(|r| r.subject.as_deref() == Some(subject))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of retained records
    pub async fn len(&self) -> usize {
        self.buffer.read().await.len()
    }

    /// Whether nothing is retained
    pub async fn is_empty(&self) -> bool {
        self.buffer.read().await.is_empty()
    }

    /// Aggregate counts over retained records
    pub async fn stats(&self) -> AuditStats {
        let buffer = self.buffer.read().await;
        let total = buffer.len();
        let allowed = buffer.iter().filter(|r| r.decision.allowed).count();
        let faults = buffer.iter().filter(|r| r.decision.code.is_fault()).count();
        let avg_latency_ms = if total > 0 {
            buffer.iter().map(|r| r.latency_ms).sum::<u64>() as f64 / total as f64
        } else {
            0.0
        };

        AuditStats {
            total_decisions: total,
            allowed_decisions: allowed,
            denied_decisions: total - allowed,
            fault_decisions: faults,
            avg_latency_ms,
        }
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut buffer = self.buffer.write().await;
        buffer.push_back(record.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
        Ok(())
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default)]
pub struct AuditStats {
    pub total_decisions: usize,
    pub allowed_decisions: usize,
    pub denied_decisions: usize,
    /// Denials caused by infrastructure faults
    pub fault_decisions: usize,
    pub avg_latency_ms: f64,
}

/// Non-blocking bridge between the engine and an [`AuditSink`]
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
    drain: JoinHandle<()>,
}

impl AuditDispatcher {
    /// Start the drain task on the current tokio runtime
    pub fn spawn(sink: Arc<dyn AuditSink>, buffer: usize, sink_timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(buffer.max(1));

        let drain = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match tokio::time::timeout(sink_timeout, sink.record(&record)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("Audit sink rejected decision {}: {}", record.decision.id, e);
                    }
                    Err(_) => {
                        error!(
                            "Audit sink rejected decision {}: {}",
                            record.decision.id,
                            AuditError::Timeout
                        );
                    }
                }
            }
            debug!("Audit dispatcher stopped");
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            drain,
        }
    }

    /// Queue a record without waiting
    pub fn emit(&self, record: AuditRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Audit buffer full, dropping record for decision {}", record.decision.id);
            }
            Err(TrySendError::Closed(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!("Audit dispatcher closed, dropping record for decision {}", record.decision.id);
            }
        }
    }

    /// Records dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting records and wait until queued ones reach the sink
    pub async fn close(self) {
        let Self { tx, drain, .. } = self;
        drop(tx);
        if let Err(e) = drain.await {
            error!("Audit drain task failed: {}", e);
        }
    }
}
