//! Cache, admission and pipeline configuration structures.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

const ENV_AUTOMATION_URL: &str = "OPPORTUNITY_GUARD_AUTOMATION_URL";
const ENV_CACHE_DIR: &str = "OPPORTUNITY_GUARD_CACHE_DIR";
const ENV_QUEUE_DEPTH: &str = "OPPORTUNITY_GUARD_QUEUE_DEPTH";

/// Cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub max_entries: usize,
    /// TTL applied when `set` is called without one.
    pub default_ttl_secs: u64,
    /// Memory bound in megabytes, used when `max_memory_bytes` is absent.
    pub max_memory_mb: usize,
    /// Exact memory bound in bytes; overrides `max_memory_mb`.
    pub max_memory_bytes: Option<usize>,
    /// Interval between background sweeps of expired entries.
    pub cleanup_interval_secs: u64,
    /// Snapshot file; persistence is disabled when absent.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_secs: 3600,
            max_memory_mb: 100,
            max_memory_bytes: None,
            cleanup_interval_secs: 300,
            snapshot_path: None,
        }
    }
}

impl CacheConfig {
    /// Effective memory bound in bytes.
    #[must_use]
    pub fn memory_limit_bytes(&self) -> usize {
        self.max_memory_bytes
            .unwrap_or_else(|| self.max_memory_mb.saturating_mul(1024 * 1024))
    }

    /// Validate cache configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".into());
        }
        if self.memory_limit_bytes() == 0 {
            return Err("memory bound must be greater than 0".into());
        }
        if self.default_ttl_secs == 0 {
            return Err("default_ttl_secs must be greater than 0".into());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Purpose of a cache instance. Each kind has its own bounds, TTL and snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Responses served by the request layer.
    Api,
    /// Aggregated statistics.
    Analytics,
    /// Per-profile data.
    User,
}

impl CacheKind {
    /// Every kind, in reporting order.
    pub const ALL: [Self; 3] = [Self::Api, Self::Analytics, Self::User];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Analytics => "analytics",
            Self::User => "user",
        }
    }

    /// Parse a cache name; unknown names fall back to [`CacheKind::Api`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "analytics" => Self::Analytics,
            "user" => Self::User,
            "api" => Self::Api,
            other => {
                tracing::debug!(cache = other, "unknown cache kind, using api");
                Self::Api
            }
        }
    }

    /// File name used when snapshots go to a shared directory.
    #[must_use]
    pub const fn snapshot_file_name(self) -> &'static str {
        match self {
            Self::Api => "api_cache.json",
            Self::Analytics => "analytics_cache.json",
            Self::User => "user_cache.json",
        }
    }

    /// Bounds used when the configuration does not override them.
    #[must_use]
    pub fn default_config(self) -> CacheConfig {
        let (max_entries, default_ttl_secs, max_memory_mb) = match self {
            Self::Api => (500, 300, 50),
            Self::Analytics => (100, 1800, 25),
            Self::User => (200, 86_400, 25),
        };
        CacheConfig {
            max_entries,
            default_ttl_secs,
            max_memory_mb,
            ..CacheConfig::default()
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial cache section; absent fields keep the kind's defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CacheOverrides {
    max_entries: Option<usize>,
    default_ttl_secs: Option<u64>,
    max_memory_mb: Option<usize>,
    max_memory_bytes: Option<usize>,
    cleanup_interval_secs: Option<u64>,
    snapshot_path: Option<PathBuf>,
}

impl CacheOverrides {
    fn apply(self, base: CacheConfig) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            default_ttl_secs: self.default_ttl_secs.unwrap_or(base.default_ttl_secs),
            max_memory_mb: self.max_memory_mb.unwrap_or(base.max_memory_mb),
            max_memory_bytes: self.max_memory_bytes.or(base.max_memory_bytes),
            cleanup_interval_secs: self.cleanup_interval_secs.unwrap_or(base.cleanup_interval_secs),
            snapshot_path: self.snapshot_path.or(base.snapshot_path),
        }
    }
}

fn cache_section<'de, D: Deserializer<'de>>(
    deserializer: D,
    kind: CacheKind,
) -> Result<CacheConfig, D::Error> {
    CacheOverrides::deserialize(deserializer).map(|o| o.apply(kind.default_config()))
}

fn api_section<'de, D: Deserializer<'de>>(d: D) -> Result<CacheConfig, D::Error> {
    cache_section(d, CacheKind::Api)
}

fn analytics_section<'de, D: Deserializer<'de>>(d: D) -> Result<CacheConfig, D::Error> {
    cache_section(d, CacheKind::Analytics)
}

fn user_section<'de, D: Deserializer<'de>>(d: D) -> Result<CacheConfig, D::Error> {
    cache_section(d, CacheKind::User)
}

fn api_default() -> CacheConfig {
    CacheKind::Api.default_config()
}

fn analytics_default() -> CacheConfig {
    CacheKind::Analytics.default_config()
}

fn user_default() -> CacheConfig {
    CacheKind::User.default_config()
}

/// The three independently bounded cache instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachesConfig {
    /// Request-layer responses.
    #[serde(default = "api_default", deserialize_with = "api_section")]
    pub api: CacheConfig,
    /// Aggregated statistics.
    #[serde(default = "analytics_default", deserialize_with = "analytics_section")]
    pub analytics: CacheConfig,
    /// Per-profile data.
    #[serde(default = "user_default", deserialize_with = "user_section")]
    pub user: CacheConfig,
    /// Directory for snapshots of kinds without an explicit `snapshot_path`.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            api: api_default(),
            analytics: analytics_default(),
            user: user_default(),
            snapshot_dir: None,
        }
    }
}

impl CachesConfig {
    /// Section for `kind` as written.
    #[must_use]
    pub const fn get(&self, kind: CacheKind) -> &CacheConfig {
        match kind {
            CacheKind::Api => &self.api,
            CacheKind::Analytics => &self.analytics,
            CacheKind::User => &self.user,
        }
    }

    /// Mutable section for `kind`.
    pub fn get_mut(&mut self, kind: CacheKind) -> &mut CacheConfig {
        match kind {
            CacheKind::Api => &mut self.api,
            CacheKind::Analytics => &mut self.analytics,
            CacheKind::User => &mut self.user,
        }
    }

    /// Effective section for `kind`, with the snapshot path resolved against
    /// `snapshot_dir`.
    #[must_use]
    pub fn resolved(&self, kind: CacheKind) -> CacheConfig {
        let mut config = self.get(kind).clone();
        if config.snapshot_path.is_none() {
            config.snapshot_path = self
                .snapshot_dir
                .as_ref()
                .map(|dir| dir.join(kind.snapshot_file_name()));
        }
        config
    }

    /// Validate every section. Two kinds may not share a snapshot file.
    pub fn validate(&self) -> Result<(), String> {
        let mut paths: Vec<(CacheKind, PathBuf)> = Vec::new();
        for kind in CacheKind::ALL {
            let config = self.resolved(kind);
            config.validate().map_err(|e| format!("`{kind}`: {e}"))?;
            if let Some(path) = config.snapshot_path {
                if let Some((other, _)) = paths.iter().find(|(_, p)| *p == path) {
                    return Err(format!(
                        "`{kind}` and `{other}` share snapshot file {}",
                        path.display()
                    ));
                }
                paths.push((kind, path));
            }
        }
        Ok(())
    }
}

/// Admission category. Each has its own independently configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// General API traffic.
    Api,
    /// Actions that trigger a scrape.
    Scraping,
    /// Authentication attempts.
    Auth,
    /// Heavy actions such as participation submissions.
    Heavy,
}

impl Category {
    /// Every category, in reporting order.
    pub const ALL: [Self; 4] = [Self::Api, Self::Scraping, Self::Auth, Self::Heavy];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scraping => "scraping",
            Self::Auth => "auth",
            Self::Heavy => "heavy",
        }
    }

    /// Parse a category name; unknown names fall back to [`Category::Api`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "scraping" => Self::Scraping,
            "auth" => Self::Auth,
            "heavy" => Self::Heavy,
            "api" => Self::Api,
            other => {
                tracing::debug!(category = other, "unknown admission category, using api");
                Self::Api
            }
        }
    }

    /// Limit used when the configuration does not name this category.
    #[must_use]
    pub const fn default_limit(self) -> CategoryLimit {
        match self {
            Self::Api => CategoryLimit::new(100, 60),
            Self::Scraping => CategoryLimit::new(10, 60),
            Self::Auth => CategoryLimit::new(5, 300),
            Self::Heavy => CategoryLimit::new(5, 60),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests allowed per trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimit {
    /// Maximum requests inside one window.
    #[serde(alias = "maxRequests")]
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(alias = "windowSeconds")]
    pub window_seconds: u64,
}

impl CategoryLimit {
    /// Create a limit.
    #[must_use]
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    /// Window length in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> u64 {
        self.window_seconds.saturating_mul(1000)
    }

    /// Both the request count and the window must be non-zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".into());
        }
        if self.window_seconds == 0 {
            return Err("window_seconds must be greater than 0".into());
        }
        Ok(())
    }
}

/// Admission controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Per-category overrides; missing categories use their defaults.
    pub categories: HashMap<Category, CategoryLimit>,
    /// Interval between background sweeps of idle client windows.
    pub prune_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            categories: HashMap::new(),
            prune_interval_secs: 300,
        }
    }
}

impl AdmissionConfig {
    /// Limits for every category, with defaults filled in.
    #[must_use]
    pub fn resolved(&self) -> HashMap<Category, CategoryLimit> {
        Category::ALL
            .iter()
            .map(|c| (*c, self.categories.get(c).copied().unwrap_or(c.default_limit())))
            .collect()
    }

    /// Validate all configured limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.prune_interval_secs == 0 {
            return Err("prune_interval_secs must be greater than 0".into());
        }
        for (category, limit) in &self.categories {
            limit
                .validate()
                .map_err(|e| format!("category `{category}`: {e}"))?;
        }
        Ok(())
    }
}

/// Proxy rotation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Uniformly random pick per job.
    #[default]
    Random,
    /// Round-robin through the list.
    Sequential,
}

/// Outbound proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Whether a proxy is attached to automation calls.
    pub enabled: bool,
    /// Rotation policy across `list`.
    #[serde(alias = "rotationMode")]
    pub rotation_mode: RotationMode,
    /// Proxy URLs.
    pub list: Vec<String>,
}

/// Randomized human-like delay applied before each job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Lower bound of the delay in seconds.
    pub delay_seconds_min: f64,
    /// Upper bound of the delay in seconds.
    pub delay_seconds_max: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay_seconds_min: 5.0,
            delay_seconds_max: 30.0,
        }
    }
}

/// Retry policy for the automation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single backoff.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 4_000,
            max_backoff_ms: 10_000,
        }
    }
}

/// Participation pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Jobs queued before submissions are rejected.
    pub max_queue_depth: usize,
    /// How long the worker blocks on the queue before re-checking cancellation.
    pub poll_interval_ms: u64,
    /// Timeout for one automation call attempt.
    pub call_timeout_secs: u64,
    /// Base URL of the automation service.
    pub automation_url: String,
    /// Pacing delay range.
    pub pacing: PacingConfig,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Proxy policy.
    pub proxies: ProxyConfig,
    /// Extra options forwarded verbatim in the automation call config.
    pub automation_options: serde_json::Map<String, serde_json::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 1000,
            poll_interval_ms: 1000,
            call_timeout_secs: 120,
            automation_url: "http://localhost:3000".into(),
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            proxies: ProxyConfig::default(),
            automation_options: serde_json::Map::new(),
        }
    }
}

impl PipelineConfig {
    /// Validate pipeline configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".into());
        }
        let pacing = &self.pacing;
        if !(pacing.delay_seconds_min.is_finite() && pacing.delay_seconds_max.is_finite())
            || pacing.delay_seconds_min < 0.0
        {
            return Err("pacing delays must be finite and non-negative".into());
        }
        if pacing.delay_seconds_min > pacing.delay_seconds_max {
            return Err("delay_seconds_min must not exceed delay_seconds_max".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".into());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err("retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into());
        }
        if self.proxies.enabled && self.proxies.list.iter().any(|p| p.trim().is_empty()) {
            return Err("proxy list contains an empty entry".into());
        }
        Ok(())
    }
}

/// Root configuration for all three components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache instances by kind.
    pub caches: CachesConfig,
    /// Admission controller settings.
    pub admission: AdmissionConfig,
    /// Participation pipeline settings.
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.caches.validate().map_err(|e| format!("cache invalid: {e}"))?;
        self.admission
            .validate()
            .map_err(|e| format!("admission invalid: {e}"))?;
        self.pipeline
            .validate()
            .map_err(|e| format!("pipeline invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` (if present) and apply environment overrides, then validate.
    pub fn apply_env_overrides(mut self) -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to read .env file");
            }
        }
        if let Ok(url) = std::env::var(ENV_AUTOMATION_URL) {
            self.pipeline.automation_url = url;
        }
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            self.caches.snapshot_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Ok(depth) = std::env::var(ENV_QUEUE_DEPTH) {
            self.pipeline.max_queue_depth = depth
                .parse()
                .map_err(|e| format!("{ENV_QUEUE_DEPTH}: {e}"))?;
        }
        self.validate()?;
        Ok(self)
    }
}
