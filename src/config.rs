//! Configuration for the resolution engine
//!
//! Defaults are compile-time constants; callers override them through
//! [`ResolverConfigBuilder`].

use crate::index::{DEFAULT_PARALLEL_THRESHOLD, DEFAULT_SEARCH_CHUNKS};
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum age of a cache file, in days
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;
/// Default number of concurrent resolutions
pub const DEFAULT_CONCURRENCY: usize = 16;
/// Default timeout for a single registry query in milliseconds
pub const DEFAULT_REGISTRY_TIMEOUT_MS: u64 = 5000;
/// Default number of retries for transient registry failures
pub const DEFAULT_REGISTRY_RETRIES: u32 = 1;
/// Default delay between registry retries in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
/// RIPEstat announced-prefixes endpoint
pub const DEFAULT_RIPE_URL: &str = "https://stat.ripe.net/data/announced-prefixes/data.json";

/// Settings for the external registry client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Announced-prefixes endpoint (queried with `?resource=<ASN>`)
    pub ripe_url: String,
    /// Timeout for a single query
    pub timeout: Duration,
    /// Retries for transient failures (0 disables retrying)
    pub retries: u32,
    /// Delay between retries
    pub retry_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ripe_url: DEFAULT_RIPE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_REGISTRY_TIMEOUT_MS),
            retries: DEFAULT_REGISTRY_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Configuration for the store and resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Cache file; `None` keeps the cache in memory for this run only
    pub cache_path: Option<PathBuf>,
    /// Cache files older than this many days are discarded (default: 30)
    pub max_age_days: u32,
    /// Maximum number of resolutions in flight (default: 16)
    pub concurrency: usize,
    /// Family size from which index lookups use the parallel search
    pub parallel_threshold: usize,
    /// Number of chunks for the parallel search
    pub search_chunks: usize,
    /// Registry client settings
    pub registry: RegistryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            concurrency: DEFAULT_CONCURRENCY,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            search_chunks: DEFAULT_SEARCH_CHUNKS,
            registry: RegistryConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Create a new ResolverConfig builder
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        if self.search_chunks == 0 {
            return Err("search_chunks must be at least 1".to_string());
        }
        if self.registry.timeout.is_zero() {
            return Err("registry timeout must be greater than 0".to_string());
        }
        if self.registry.ripe_url.is_empty() {
            return Err("registry URL must not be empty".to_string());
        }
        Ok(())
    }
}

/// Builder for ResolverConfig
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    /// Set the cache file path
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Set the maximum cache age in days
    pub fn max_age_days(mut self, days: u32) -> Self {
        self.config.max_age_days = days;
        self
    }

    /// Set the number of concurrent resolutions
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the family size from which lookups run in parallel
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.config.parallel_threshold = threshold;
        self
    }

    /// Set the number of parallel search chunks
    pub fn search_chunks(mut self, chunks: usize) -> Self {
        self.config.search_chunks = chunks;
        self
    }

    /// Set the announced-prefixes endpoint
    pub fn ripe_url(mut self, url: impl Into<String>) -> Self {
        self.config.registry.ripe_url = url.into();
        self
    }

    /// Set the timeout for a single registry query
    pub fn registry_timeout(mut self, timeout: Duration) -> Self {
        self.config.registry.timeout = timeout;
        self
    }

    /// Set the number of retries for transient registry failures
    pub fn registry_retries(mut self, retries: u32) -> Self {
        self.config.registry.retries = retries;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ResolverConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
