//! Builders to construct the service instances from configuration.
//!
//! Every component is an explicit instance shared by `Arc`; nothing is a
//! process-wide singleton, so tests can build several independent sets.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::config::{AppConfig, CacheKind, CachesConfig};
use crate::core::{
    AdmissionController, AppResult, AutomationClient, CacheStats, CacheStore, OutcomeRecorder,
    ParticipationPipeline, ReclaimTarget, Reclaimer,
};
use crate::infra::HttpAutomationClient;

/// Cache of JSON values used by the request layer.
pub type JsonCache = CacheStore<serde_json::Value>;

/// One independently bounded cache per [`CacheKind`].
pub struct CacheSet {
    api: Arc<JsonCache>,
    analytics: Arc<JsonCache>,
    user: Arc<JsonCache>,
}

impl CacheSet {
    /// Open every cache, restoring snapshots where persistence is configured.
    #[must_use]
    pub fn open(config: &CachesConfig) -> Self {
        Self {
            api: Arc::new(JsonCache::open(&config.resolved(CacheKind::Api))),
            analytics: Arc::new(JsonCache::open(&config.resolved(CacheKind::Analytics))),
            user: Arc::new(JsonCache::open(&config.resolved(CacheKind::User))),
        }
    }

    /// Cache for `kind`.
    #[must_use]
    pub const fn get(&self, kind: CacheKind) -> &Arc<JsonCache> {
        match kind {
            CacheKind::Api => &self.api,
            CacheKind::Analytics => &self.analytics,
            CacheKind::User => &self.user,
        }
    }

    /// Cache by name; unknown names resolve to the api cache.
    #[must_use]
    pub fn by_name(&self, name: &str) -> &Arc<JsonCache> {
        self.get(CacheKind::parse(name))
    }

    /// Every cache with its kind.
    pub fn iter(&self) -> impl Iterator<Item = (CacheKind, &Arc<JsonCache>)> {
        CacheKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Statistics of every cache.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<CacheKind, CacheStats> {
        self.iter().map(|(kind, cache)| (kind, cache.stats())).collect()
    }
}

/// The long-lived service graph: caches, admission controller and pipeline.
pub struct Services<C: AutomationClient> {
    /// Cache instances by kind.
    pub caches: CacheSet,
    /// Shared admission controller.
    pub limiter: Arc<AdmissionController>,
    /// Participation pipeline.
    pub pipeline: Arc<ParticipationPipeline<C>>,
    /// Background sweeps of the caches and idle admission windows.
    pub reclaimer: Reclaimer,
}

impl<C: AutomationClient> Services<C> {
    /// Cache for `kind`.
    #[must_use]
    pub const fn cache(&self, kind: CacheKind) -> &Arc<JsonCache> {
        self.caches.get(kind)
    }

    /// Stop the pipeline worker, then the reclaimer (which writes the final snapshots).
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
        self.reclaimer.shutdown();
        info!("services shut down");
    }
}

/// Validate `cfg` and construct every service around `client` and `recorder`.
///
/// # Errors
///
/// Fails when the configuration is invalid or a background thread cannot start.
pub fn build_services<C: AutomationClient>(
    cfg: &AppConfig,
    client: Arc<C>,
    recorder: Arc<dyn OutcomeRecorder>,
) -> AppResult<Services<C>> {
    cfg.validate().map_err(|e| anyhow!("config invalid: {e}"))?;

    let caches = CacheSet::open(&cfg.caches);
    let limiter = Arc::new(AdmissionController::new(&cfg.admission));

    let mut targets: Vec<ReclaimTarget> = caches
        .iter()
        .map(|(kind, cache)| {
            let every = Duration::from_secs(cfg.caches.get(kind).cleanup_interval_secs);
            ReclaimTarget::new(format!("cache:{kind}"), Arc::clone(cache), every)
        })
        .collect();
    targets.push(ReclaimTarget::new(
        "admission",
        Arc::clone(&limiter),
        Duration::from_secs(cfg.admission.prune_interval_secs),
    ));
    let reclaimer = Reclaimer::spawn(targets).context("failed to start reclaimer")?;

    let pipeline = ParticipationPipeline::new(&cfg.pipeline, client, recorder)
        .context("failed to start participation pipeline")?;

    info!(
        restored_api = caches.get(CacheKind::Api).len(),
        restored_analytics = caches.get(CacheKind::Analytics).len(),
        restored_user = caches.get(CacheKind::User).len(),
        "services built"
    );

    Ok(Services {
        caches,
        limiter,
        pipeline: Arc::new(pipeline),
        reclaimer,
    })
}

/// [`build_services`] with the HTTP automation client from `cfg.pipeline`.
///
/// # Errors
///
/// As `build_services`, plus an invalid automation URL.
pub fn build_http_services(
    cfg: &AppConfig,
    recorder: Arc<dyn OutcomeRecorder>,
) -> AppResult<Services<HttpAutomationClient>> {
    let client = HttpAutomationClient::from_config(&cfg.pipeline)
        .context("failed to build automation client")?;
    build_services(cfg, Arc::new(client), recorder)
}
