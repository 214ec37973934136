//! Engine configuration
//!
//! Defaults suit most deployments. Overrides come from a JSON file or the
//! environment:
//!
//! - `ACCESSGUARD_CACHE_ENABLED` - decision cache on/off (default: true)
//! - `ACCESSGUARD_CACHE_TTL_SECS` - decision TTL in seconds (default: 60)
//! - `ACCESSGUARD_CACHE_CAPACITY` - maximum cached decisions (default: 10000)
//! - `ACCESSGUARD_DIRECTORY_TIMEOUT_MS` - directory deadline (default: 2000)
//! - `ACCESSGUARD_AUDIT_BUFFER` - queued audit records (default: 1024)
//! - `ACCESSGUARD_AUDIT_TIMEOUT_MS` - audit sink deadline (default: 5000)
//! - `ACCESSGUARD_METRICS_ENABLED` - metrics on/off (default: true)
//! - `ACCESSGUARD_EMAIL_CLAIM` - claim carrying the subject email (default: email)

use crate::audit::{DEFAULT_AUDIT_BUFFER, DEFAULT_SINK_TIMEOUT};
use crate::claims::{ClaimsConfig, DEFAULT_EMAIL_CLAIM};
use crate::engine::cache::CacheConfig;
use crate::error::{AuthzError, Result};
use crate::roles::DEFAULT_DIRECTORY_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Policy engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable the decision cache
    pub enable_cache: bool,

    /// Decision TTL in seconds
    pub cache_ttl_secs: u64,

    /// Maximum number of cached decisions
    pub cache_capacity: usize,

    /// Directory lookup deadline in milliseconds
    pub directory_timeout_ms: u64,

    /// Audit records buffered between the engine and the sink
    pub audit_buffer: usize,

    /// Deadline for the sink to accept one record, in milliseconds
    pub audit_timeout_ms: u64,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Claim carrying the subject email
    pub email_claim: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            enable_cache: true,
            cache_ttl_secs: cache.ttl.as_secs(),
            cache_capacity: cache.capacity,
            directory_timeout_ms: DEFAULT_DIRECTORY_TIMEOUT.as_millis() as u64,
            audit_buffer: DEFAULT_AUDIT_BUFFER,
            audit_timeout_ms: DEFAULT_SINK_TIMEOUT.as_millis() as u64,
            enable_metrics: true,
            email_claim: DEFAULT_EMAIL_CLAIM.to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ACCESSGUARD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_CACHE_ENABLED")? {
            config.enable_cache = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_CACHE_TTL_SECS")? {
            config.cache_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_CACHE_CAPACITY")? {
            config.cache_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_DIRECTORY_TIMEOUT_MS")? {
            config.directory_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_AUDIT_BUFFER")? {
            config.audit_buffer = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_AUDIT_TIMEOUT_MS")? {
            config.audit_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "ACCESSGUARD_METRICS_ENABLED")? {
            config.enable_metrics = v;
        }
        if let Some(v) = lookup("ACCESSGUARD_EMAIL_CLAIM") {
            config.email_claim = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.enable_cache && self.cache_ttl_secs == 0 {
            return Err(AuthzError::Config("cache_ttl_secs must be positive".to_string()));
        }
        if self.enable_cache && self.cache_capacity == 0 {
            return Err(AuthzError::Config("cache_capacity must be positive".to_string()));
        }
        if self.directory_timeout_ms == 0 {
            return Err(AuthzError::Config("directory_timeout_ms must be positive".to_string()));
        }
        if self.audit_buffer == 0 {
            return Err(AuthzError::Config("audit_buffer must be positive".to_string()));
        }
        if self.audit_timeout_ms == 0 {
            return Err(AuthzError::Config("audit_timeout_ms must be positive".to_string()));
        }
        if self.email_claim.trim().is_empty() {
            return Err(AuthzError::Config("email_claim cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Cache settings
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    /// Claims extractor settings
    pub fn claims_config(&self) -> ClaimsConfig {
        ClaimsConfig {
            email_claim: self.email_claim.clone(),
        }
    }

    /// Directory deadline
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    /// Audit sink deadline
    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AuthzError::Config(format!("{}={:?}: {}", name, raw, e))),
    }
}
