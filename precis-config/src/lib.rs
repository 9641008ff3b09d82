use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Pre-compiled regex for hostname validation (compiled once at first use)
static HOSTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][-a-zA-Z0-9\.]*[a-zA-Z0-9]$").unwrap());

/// Presentation modes accepted for `summarizer.default_style`.
pub const KNOWN_STYLES: &[&str] = &["concise", "detailed", "bullet", "bulleted", "executive"];

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub cache: Option<CacheSection>,
    #[serde(default)]
    pub throttle: Option<ThrottleSection>,
    #[serde(default)]
    pub summarizer: Option<SummarizerSection>,
    #[serde(default)]
    pub upstream: Option<UpstreamSection>,
    #[serde(default)]
    pub queue: Option<QueueSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ThrottleSection {
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
    #[serde(default)]
    pub default_cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizerSection {
    #[serde(default)]
    pub default_max_length: Option<u32>,
    #[serde(default)]
    pub default_style: Option<String>,
    #[serde(default)]
    pub min_words: Option<usize>,
    #[serde(default)]
    pub max_words: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueSection {
    #[serde(default)]
    pub worker_concurrency: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
    #[serde(default)]
    pub lease_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub completed_max_count: Option<usize>,
    #[serde(default)]
    pub completed_max_age_secs: Option<u64>,
    #[serde(default)]
    pub failed_max_count: Option<usize>,
    #[serde(default)]
    pub failed_max_age_secs: Option<u64>,
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default)]
    pub snapshot_interval_secs: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try every enabled format in turn.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete application configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub throttle: ThrottleConfig,
    pub summarizer: SummarizerConfig,
    pub upstream: UpstreamConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheConfig {
    /// `memory` or `redis`.
    pub backend: String,
    pub redis_url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleConfig {
    pub min_request_interval_ms: u64,
    /// Cooldown applied when the upstream signals overload without a retry-after value.
    pub default_cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizerConfig {
    pub default_max_length: u32,
    pub default_style: String,
    pub min_words: usize,
    pub max_words: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub site_url: String,
    pub site_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueConfig {
    pub worker_concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub lease_secs: u64,
    pub poll_interval_ms: u64,
    pub completed_max_count: usize,
    pub completed_max_age_secs: u64,
    pub failed_max_count: usize,
    pub failed_max_age_secs: u64,
    pub snapshot_path: Option<String>,
    pub snapshot_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            cache: CacheConfig {
                backend: "memory".to_string(),
                redis_url: None,
                ttl_seconds: 86_400,
            },
            throttle: ThrottleConfig {
                min_request_interval_ms: 2_000,
                default_cooldown_secs: 120,
            },
            summarizer: SummarizerConfig {
                default_max_length: 200,
                default_style: "concise".to_string(),
                min_words: 50,
                max_words: 5_000,
            },
            upstream: UpstreamConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "deepseek/deepseek-chat-v3-0324".to_string(),
                api_key: None,
                timeout_secs: 45,
                site_url: "http://localhost:5173".to_string(),
                site_name: "precis".to_string(),
            },
            queue: QueueConfig {
                worker_concurrency: 5,
                max_attempts: 3,
                backoff_base_ms: 2_000,
                lease_secs: 300,
                poll_interval_ms: 1_000,
                completed_max_count: 100,
                completed_max_age_secs: 24 * 3_600,
                failed_max_count: 50,
                failed_max_age_secs: 7 * 24 * 3_600,
                snapshot_path: None,
                snapshot_interval_secs: 30,
            },
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(()),
    }
}

/// Strip surrounding whitespace and stray quotes that often sneak into secrets
/// pasted into `.env` files.
#[inline]
fn clean_secret(s: &str) -> Option<String> {
    let cleaned: String = s.trim().chars().filter(|c| *c != '"' && *c != '\'').collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        apply_file(&mut cfg, raw);
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_file(cfg: &mut Config, raw: RawConfigFile) {
    if let Some(server) = raw.server {
        apply_opt!(cfg.server.host, server.host);
        apply_opt!(cfg.server.port, server.port);
    }
    if let Some(logging) = raw.logging {
        apply_opt!(cfg.logging.level, logging.level);
        apply_opt!(cfg.logging.json, logging.json);
    }
    if let Some(cache) = raw.cache {
        apply_opt!(cfg.cache.backend, cache.backend);
        apply_opt!(cfg.cache.redis_url, cache.redis_url, wrap);
        apply_opt!(cfg.cache.ttl_seconds, cache.ttl_seconds);
    }
    if let Some(t) = raw.throttle {
        apply_opt!(cfg.throttle.min_request_interval_ms, t.min_request_interval_ms);
        apply_opt!(cfg.throttle.default_cooldown_secs, t.default_cooldown_secs);
    }
    if let Some(s) = raw.summarizer {
        apply_opt!(cfg.summarizer.default_max_length, s.default_max_length);
        apply_opt!(cfg.summarizer.default_style, s.default_style);
        apply_opt!(cfg.summarizer.min_words, s.min_words);
        apply_opt!(cfg.summarizer.max_words, s.max_words);
    }
    if let Some(u) = raw.upstream {
        apply_opt!(cfg.upstream.base_url, u.base_url);
        apply_opt!(cfg.upstream.model, u.model);
        if let Some(key) = u.api_key.as_deref().and_then(clean_secret) {
            cfg.upstream.api_key = Some(key);
        }
        apply_opt!(cfg.upstream.timeout_secs, u.timeout_secs);
        apply_opt!(cfg.upstream.site_url, u.site_url);
        apply_opt!(cfg.upstream.site_name, u.site_name);
    }
    if let Some(q) = raw.queue {
        apply_opt!(cfg.queue.worker_concurrency, q.worker_concurrency);
        apply_opt!(cfg.queue.max_attempts, q.max_attempts);
        apply_opt!(cfg.queue.backoff_base_ms, q.backoff_base_ms);
        apply_opt!(cfg.queue.lease_secs, q.lease_secs);
        apply_opt!(cfg.queue.poll_interval_ms, q.poll_interval_ms);
        apply_opt!(cfg.queue.completed_max_count, q.completed_max_count);
        apply_opt!(cfg.queue.completed_max_age_secs, q.completed_max_age_secs);
        apply_opt!(cfg.queue.failed_max_count, q.failed_max_count);
        apply_opt!(cfg.queue.failed_max_age_secs, q.failed_max_age_secs);
        apply_opt!(cfg.queue.snapshot_path, q.snapshot_path, wrap);
        apply_opt!(cfg.queue.snapshot_interval_secs, q.snapshot_interval_secs);
    }
}

/// Helper to parse env var as a specific type
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Server
    if let Some(v) = env_str("PRECIS_SERVER_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_parse::<u16>("PRECIS_SERVER_PORT")? {
        cfg.server.port = v;
    }

    // Logging
    if let Some(v) = env_str("PRECIS_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("PRECIS_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // Cache
    if let Some(v) = env_str("PRECIS_CACHE_BACKEND") {
        cfg.cache.backend = v;
    }
    // Plain REDIS_URL is honoured as a fallback for existing deployments
    if let Some(v) = env_str("PRECIS_REDIS_URL").or_else(|| env_str("REDIS_URL")) {
        cfg.cache.redis_url = Some(v);
    }
    if let Some(v) = env_parse::<u64>("PRECIS_CACHE_TTL_SECONDS")? {
        cfg.cache.ttl_seconds = v;
    }

    // Throttle
    if let Some(v) = env_parse::<u64>("PRECIS_MIN_REQUEST_INTERVAL_MS")? {
        cfg.throttle.min_request_interval_ms = v;
    }
    if let Some(v) = env_parse::<u64>("PRECIS_DEFAULT_COOLDOWN_SECS")? {
        cfg.throttle.default_cooldown_secs = v;
    }

    // Summarizer
    if let Some(v) = env_parse::<u32>("PRECIS_MAX_LENGTH")? {
        cfg.summarizer.default_max_length = v;
    }
    if let Some(v) = env_str("PRECIS_STYLE") {
        cfg.summarizer.default_style = v;
    }
    if let Some(v) = env_parse::<usize>("PRECIS_MIN_WORDS")? {
        cfg.summarizer.min_words = v;
    }
    if let Some(v) = env_parse::<usize>("PRECIS_MAX_WORDS")? {
        cfg.summarizer.max_words = v;
    }

    // Upstream
    if let Some(v) = env_str("PRECIS_UPSTREAM_BASE_URL") {
        cfg.upstream.base_url = v;
    }
    if let Some(v) = env_str("PRECIS_UPSTREAM_MODEL") {
        cfg.upstream.model = v;
    }
    if let Some(v) = env_str("PRECIS_UPSTREAM_API_KEY").or_else(|| env_str("OPENROUTER_API_KEY")) {
        cfg.upstream.api_key = clean_secret(&v);
    }
    if let Some(v) = env_parse::<u64>("PRECIS_UPSTREAM_TIMEOUT_SECS")? {
        cfg.upstream.timeout_secs = v;
    }
    if let Some(v) = env_str("PRECIS_SITE_URL") {
        cfg.upstream.site_url = v;
    }
    if let Some(v) = env_str("PRECIS_SITE_NAME") {
        cfg.upstream.site_name = v;
    }

    // Queue
    if let Some(v) = env_parse::<usize>("PRECIS_WORKER_CONCURRENCY")? {
        cfg.queue.worker_concurrency = v;
    }
    if let Some(v) = env_parse::<u32>("PRECIS_MAX_ATTEMPTS")? {
        cfg.queue.max_attempts = v;
    }
    if let Some(v) = env_parse::<u64>("PRECIS_BACKOFF_BASE_MS")? {
        cfg.queue.backoff_base_ms = v;
    }
    if let Some(v) = env_parse::<u64>("PRECIS_LEASE_SECS")? {
        cfg.queue.lease_secs = v;
    }
    if let Some(v) = env_str("PRECIS_QUEUE_SNAPSHOT_PATH") {
        cfg.queue.snapshot_path = Some(v);
    }
    if let Some(v) = env_parse::<u64>("PRECIS_QUEUE_SNAPSHOT_INTERVAL_SECS")? {
        cfg.queue.snapshot_interval_secs = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be > 0".into()));
    }
    let host_ok = cfg.server.host.parse::<std::net::IpAddr>().is_ok()
        || HOSTNAME_REGEX.is_match(&cfg.server.host);
    if !host_ok {
        return Err(ConfigError::Validation(format!(
            "invalid server.host: {}",
            cfg.server.host
        )));
    }

    match cfg.cache.backend.as_str() {
        "memory" => {}
        "redis" => {
            if cfg
                .cache
                .redis_url
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(ConfigError::Validation(
                    "cache.redis_url must be set for the redis backend".to_string(),
                ));
            }
        }
        other => {
            return Err(ConfigError::Validation(format!(
                "unsupported cache backend: {}",
                other
            )))
        }
    }
    if cfg.cache.ttl_seconds == 0 {
        return Err(ConfigError::Validation(
            "cache.ttl_seconds must be > 0".into(),
        ));
    }

    if cfg.throttle.min_request_interval_ms > 60_000 {
        return Err(ConfigError::Validation(
            "throttle.min_request_interval_ms must be at most 60000".into(),
        ));
    }

    if cfg.summarizer.default_max_length == 0 {
        return Err(ConfigError::Validation(
            "summarizer.default_max_length must be > 0".into(),
        ));
    }
    if !KNOWN_STYLES.contains(&cfg.summarizer.default_style.as_str()) {
        return Err(ConfigError::Validation(format!(
            "unknown summarizer.default_style: {}",
            cfg.summarizer.default_style
        )));
    }
    if cfg.summarizer.min_words > cfg.summarizer.max_words {
        return Err(ConfigError::Validation(
            "summarizer.min_words must not exceed summarizer.max_words".into(),
        ));
    }

    match url::Url::parse(&cfg.upstream.base_url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
        Ok(_) => {
            return Err(ConfigError::Validation(format!(
                "upstream.base_url must be http or https: {}",
                cfg.upstream.base_url
            )))
        }
        Err(_) => {
            return Err(ConfigError::Validation(format!(
                "invalid upstream.base_url: {}",
                cfg.upstream.base_url
            )))
        }
    }

    if cfg.queue.worker_concurrency == 0 {
        return Err(ConfigError::Validation(
            "queue.worker_concurrency must be > 0".into(),
        ));
    }
    if cfg.queue.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "queue.max_attempts must be > 0".into(),
        ));
    }
    if cfg.queue.lease_secs == 0 {
        return Err(ConfigError::Validation("queue.lease_secs must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_toml() {
        let f = NamedTempFile::new().expect("tmpfile");
        std::fs::write(
            f.path(),
            r#"
[server]
host = "127.0.0.1"
port = 9000

[throttle]
min_request_interval_ms = 500

[queue]
worker_concurrency = 2
"#,
        )
        .unwrap();
        let raw = load_raw_from_file(f.path()).expect("load");
        let server = raw.server.expect("server section");
        assert_eq!(server.host.unwrap(), "127.0.0.1");
        assert_eq!(server.port.unwrap(), 9000);
        assert_eq!(raw.throttle.unwrap().min_request_interval_ms, Some(500));
        assert_eq!(raw.queue.unwrap().worker_concurrency, Some(2));
    }

    #[test]
    fn parse_yaml() {
        let f = NamedTempFile::new().expect("tmpfile");
        std::fs::write(
            f.path(),
            r#"
cache:
  backend: redis
  redis_url: redis://cache:6379
  ttl_seconds: 600
summarizer:
  default_style: bullet
"#,
        )
        .unwrap();
        let raw = load_raw_from_file(f.path()).expect("load");
        let cache = raw.cache.expect("cache section");
        assert_eq!(cache.backend.as_deref(), Some("redis"));
        assert_eq!(cache.ttl_seconds, Some(600));
        assert_eq!(
            raw.summarizer.unwrap().default_style.as_deref(),
            Some("bullet")
        );
    }

    #[test]
    fn file_values_land_in_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("precis.json");
        std::fs::write(
            &path,
            r#"{ "upstream": { "api_key": " \"sk-test\" ", "timeout_secs": 10 },
                 "queue": { "max_attempts": 5, "snapshot_path": "/tmp/q.json" } }"#,
        )
        .unwrap();
        let mut cfg = Config::default();
        apply_file(&mut cfg, load_raw_from_file(&path).expect("load"));
        assert_eq!(cfg.upstream.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.upstream.timeout_secs, 10);
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.queue.snapshot_path.as_deref(), Some("/tmp/q.json"));
        // untouched sections keep their defaults
        assert_eq!(cfg.queue.worker_concurrency, 5);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.summarizer.default_max_length, 200);
        assert_eq!(cfg.summarizer.default_style, "concise");
        assert_eq!(cfg.cache.ttl_seconds, 86_400);
        assert_eq!(cfg.throttle.min_request_interval_ms, 2_000);
        assert_eq!(cfg.throttle.default_cooldown_secs, 120);
        assert_eq!(cfg.queue.worker_concurrency, 5);
        assert_eq!(cfg.queue.max_attempts, 3);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn env_overrides() {
        let keys = [
            "PRECIS_SERVER_PORT",
            "PRECIS_LOG_JSON",
            "PRECIS_MIN_REQUEST_INTERVAL_MS",
            "PRECIS_WORKER_CONCURRENCY",
            "PRECIS_UPSTREAM_API_KEY",
        ];
        for k in &keys {
            std::env::remove_var(k);
        }

        std::env::set_var("PRECIS_SERVER_PORT", "1234");
        std::env::set_var("PRECIS_LOG_JSON", "yes");
        std::env::set_var("PRECIS_MIN_REQUEST_INTERVAL_MS", "250");
        std::env::set_var("PRECIS_WORKER_CONCURRENCY", "8");
        std::env::set_var("PRECIS_UPSTREAM_API_KEY", "  'sk-or-v1-abc'\n");

        let cfg = load_config::<&Path>(None).expect("load config");
        assert_eq!(cfg.server.port, 1234);
        assert!(cfg.logging.json);
        assert_eq!(cfg.throttle.min_request_interval_ms, 250);
        assert_eq!(cfg.queue.worker_concurrency, 8);
        assert_eq!(cfg.upstream.api_key.as_deref(), Some("sk-or-v1-abc"));

        for k in &keys {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.cache.backend = "redis".into();
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::Validation(_))
        ));

        let mut cfg = Config::default();
        cfg.summarizer.default_style = "poetic".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.upstream.base_url = "ftp://example.com".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.summarizer.min_words = 10_000;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.queue.worker_concurrency = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn api_key_never_serialized() {
        let mut cfg = Config::default();
        cfg.upstream.api_key = Some("sk-secret".into());
        let rendered = serde_json::to_string(&cfg).expect("serialize");
        assert!(!rendered.contains("sk-secret"));
    }
}
