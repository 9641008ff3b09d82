//! Explicit construction of every long-lived component from configuration.

use std::sync::Arc;
use std::time::Duration;

use precis_cache::{CacheBackend, CacheError, CacheStore, MemoryCache};
use precis_config::Config;
use precis_job_queue::{QueueConfig, RetentionPolicy, WorkerPoolConfig};
use precis_jobs::{MemorySummaryStore, SummarizeExecutor, SummaryQueue};
use precis_summarizer::{
    CompletionClient, CompletionError, OpenRouterClient, OpenRouterConfig, Summarizer,
    SummarizerLimits, SummaryStyle, ThrottleGuard,
};
use thiserror::Error;

use crate::service::{SummaryDefaults, SummaryService};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cache backend: {0}")]
    Cache(#[from] CacheError),
    #[error("completion client: {0}")]
    Upstream(#[from] CompletionError),
    #[error("configuration: {0}")]
    Config(String),
}

/// Everything the binary wires together. The service is handed to the router;
/// the rest feeds the worker pool and background maintenance.
pub struct Components {
    pub service: SummaryService,
    pub queue: Arc<SummaryQueue>,
    pub executor: Arc<SummarizeExecutor>,
    pub store: Arc<MemorySummaryStore>,
    /// Set when the in-process cache backend is in use, for expiry sweeps.
    pub memory_cache: Option<MemoryCache>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("service", &self.service)
            .field("memory_cache", &self.memory_cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Build components talking to the configured OpenRouter endpoint.
pub fn build_components(cfg: &Config) -> Result<Components, BootstrapError> {
    let client = OpenRouterClient::new(OpenRouterConfig {
        base_url: cfg.upstream.base_url.clone(),
        model: cfg.upstream.model.clone(),
        api_key: cfg.upstream.api_key.clone(),
        timeout: Duration::from_secs(cfg.upstream.timeout_secs),
        site_url: cfg.upstream.site_url.clone(),
        site_name: cfg.upstream.site_name.clone(),
    })?;
    if cfg.upstream.api_key.is_none() {
        tracing::warn!("no upstream API key configured; summarize requests will be refused");
    }
    build_components_with_client(cfg, Arc::new(client))
}

/// Build components around an arbitrary completion client.
pub fn build_components_with_client(
    cfg: &Config,
    client: Arc<dyn CompletionClient>,
) -> Result<Components, BootstrapError> {
    let (backend, memory_cache) = cache_backend(cfg)?;
    let cache = CacheStore::new(backend, Duration::from_secs(cfg.cache.ttl_seconds));

    let throttle = Arc::new(ThrottleGuard::new(
        Duration::from_millis(cfg.throttle.min_request_interval_ms),
        Duration::from_secs(cfg.throttle.default_cooldown_secs),
    ));
    let summarizer = Summarizer::new(
        client,
        throttle.clone(),
        SummarizerLimits {
            min_words: cfg.summarizer.min_words,
            max_words: cfg.summarizer.max_words,
        },
    );

    let queue = Arc::new(SummaryQueue::new(queue_config(cfg)));
    let store = Arc::new(MemorySummaryStore::new());
    let executor = Arc::new(SummarizeExecutor::new(summarizer.clone(), store.clone()));

    let defaults = SummaryDefaults {
        max_length: cfg.summarizer.default_max_length,
        style: cfg
            .summarizer
            .default_style
            .parse::<SummaryStyle>()
            .map_err(|e| BootstrapError::Config(e.to_string()))?,
    };
    let service = SummaryService::new(summarizer, cache, queue.clone(), defaults);

    tracing::info!(
        cache_backend = %cfg.cache.backend,
        cache_ttl_secs = cfg.cache.ttl_seconds,
        min_interval_ms = cfg.throttle.min_request_interval_ms,
        max_attempts = cfg.queue.max_attempts,
        "components built"
    );

    Ok(Components {
        service,
        queue,
        executor,
        store,
        memory_cache,
    })
}

pub fn queue_config(cfg: &Config) -> QueueConfig {
    let q = &cfg.queue;
    QueueConfig {
        max_attempts: q.max_attempts,
        backoff_base: Duration::from_millis(q.backoff_base_ms),
        lease: Duration::from_secs(q.lease_secs),
        retention: RetentionPolicy {
            completed_max_count: q.completed_max_count,
            completed_max_age: Duration::from_secs(q.completed_max_age_secs),
            failed_max_count: q.failed_max_count,
            failed_max_age: Duration::from_secs(q.failed_max_age_secs),
        },
    }
}

pub fn worker_pool_config(cfg: &Config) -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency: cfg.queue.worker_concurrency,
        poll_interval: Duration::from_millis(cfg.queue.poll_interval_ms),
    }
}

fn cache_backend(
    cfg: &Config,
) -> Result<(Arc<dyn CacheBackend>, Option<MemoryCache>), BootstrapError> {
    match cfg.cache.backend.as_str() {
        "memory" => {
            let memory = MemoryCache::new();
            Ok((Arc::new(memory.clone()), Some(memory)))
        }
        "redis" => redis_backend(cfg).map(|backend| (backend, None)),
        other => Err(BootstrapError::Config(format!(
            "unknown cache backend '{other}'"
        ))),
    }
}

#[cfg(feature = "redis")]
fn redis_backend(cfg: &Config) -> Result<Arc<dyn CacheBackend>, BootstrapError> {
    let url = cfg
        .cache
        .redis_url
        .as_deref()
        .ok_or_else(|| BootstrapError::Config("cache.redis_url is required".into()))?;
    Ok(Arc::new(precis_cache::RedisCache::open(url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_backend(_cfg: &Config) -> Result<Arc<dyn CacheBackend>, BootstrapError> {
    Err(BootstrapError::Config(
        "redis cache backend requires building with the `redis` feature".into(),
    ))
}
