//! Sliding-window admission controller.
//!
//! Each `(client, category)` pair owns a window of accepted request
//! timestamps. An attempt is rejected when the window already holds
//! `max_requests` entries, and the rejection blocks the pair for twice the
//! window length. All state sits behind a single `parking_lot::Mutex`, so
//! checks on the same pair are linearized and none of them ever block on I/O.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AdmissionConfig, Category, CategoryLimit};
use crate::util::clock::now_ms;

/// Accepted timestamps and block state for one `(client, category)`.
#[derive(Debug, Default)]
struct AdmissionWindow {
    requests: VecDeque<u64>,
    blocked_until_ms: Option<u64>,
}

impl AdmissionWindow {
    fn is_blocked(&self, now_ms: u64) -> bool {
        self.blocked_until_ms.is_some_and(|until| until > now_ms)
    }

    /// Drop timestamps older than `now - window`.
    fn slide(&mut self, now_ms: u64, window_ms: u64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        while self.requests.front().is_some_and(|&ts| ts < cutoff) {
            self.requests.pop_front();
        }
    }

    fn count_in_window(&self, now_ms: u64, window_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(window_ms);
        self.requests.iter().filter(|&&ts| ts >= cutoff).count()
    }
}

struct AdmissionState {
    limits: HashMap<Category, CategoryLimit>,
    windows: HashMap<(String, Category), AdmissionWindow>,
}

impl AdmissionState {
    fn limit(&self, category: Category) -> CategoryLimit {
        self.limits
            .get(&category)
            .or_else(|| self.limits.get(&Category::Api))
            .copied()
            .unwrap_or(Category::Api.default_limit())
    }
}

/// Per-category occupancy reported by [`AdmissionController::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    /// Accepted requests inside the current window.
    pub count: usize,
    /// Configured maximum.
    pub limit: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Whether the client is blocked on this category.
    pub blocked: bool,
    /// End of the block, if one is active.
    pub blocked_until_ms: Option<u64>,
}

/// Admission status for one client across all categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// Client identifier.
    pub client_id: String,
    /// Whether any category is currently blocked.
    pub blocked: bool,
    /// Occupancy per category.
    pub categories: BTreeMap<Category, CategoryStatus>,
}

/// Thread-safe per-client, per-category rate limiter.
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(&AdmissionConfig::default())
    }
}

impl AdmissionController {
    /// Create a controller with the configured limits.
    #[must_use]
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                limits: config.resolved(),
                windows: HashMap::new(),
            }),
        }
    }

    /// Decide whether `client_id` may perform one `category` action now.
    pub fn is_allowed(&self, client_id: &str, category: Category) -> bool {
        self.is_allowed_at(client_id, category, now_ms())
    }

    /// [`is_allowed`](Self::is_allowed) evaluated at an explicit time.
    pub fn is_allowed_at(&self, client_id: &str, category: Category, now_ms: u64) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let limit = state.limit(category);
        let window_ms = limit.window_ms();

        let window = state
            .windows
            .entry((client_id.to_owned(), category))
            .or_default();

        if window.is_blocked(now_ms) {
            warn!(
                client_id,
                %category,
                blocked_until_ms = window.blocked_until_ms,
                "admission rejected: client still blocked"
            );
            return false;
        }
        window.blocked_until_ms = None;
        window.slide(now_ms, window_ms);

        let max = limit.max_requests as usize;
        if window.requests.len() >= max {
            let until = now_ms.saturating_add(window_ms.saturating_mul(2));
            window.blocked_until_ms = Some(until);
            warn!(
                client_id,
                %category,
                count = window.requests.len(),
                limit = max,
                blocked_until_ms = until,
                "admission limit exceeded, client blocked"
            );
            return false;
        }

        window.requests.push_back(now_ms);
        let count = window.requests.len();
        if count * 5 > max * 4 {
            info!(client_id, %category, count, limit = max, "client approaching admission limit");
        }
        true
    }

    /// Parse `category` leniently and check admission. Unknown names use the API limits.
    pub fn is_allowed_named(&self, client_id: &str, category: &str) -> bool {
        self.is_allowed(client_id, Category::parse(category))
    }

    /// Report occupancy for every category.
    pub fn status(&self, client_id: &str) -> ClientStatus {
        self.status_at(client_id, now_ms())
    }

    /// [`status`](Self::status) evaluated at an explicit time.
    pub fn status_at(&self, client_id: &str, now_ms: u64) -> ClientStatus {
        let state = self.state.lock();
        let categories: BTreeMap<Category, CategoryStatus> = Category::ALL
            .iter()
            .map(|&category| {
                let limit = state.limit(category);
                let window = state.windows.get(&(client_id.to_owned(), category));
                let blocked = window.is_some_and(|w| w.is_blocked(now_ms));
                let status = CategoryStatus {
                    count: window.map_or(0, |w| w.count_in_window(now_ms, limit.window_ms())),
                    limit: limit.max_requests,
                    window_seconds: limit.window_seconds,
                    blocked,
                    blocked_until_ms: if blocked {
                        window.and_then(|w| w.blocked_until_ms)
                    } else {
                        None
                    },
                };
                (category, status)
            })
            .collect();
        ClientStatus {
            client_id: client_id.to_owned(),
            blocked: categories.values().any(|c| c.blocked),
            categories,
        }
    }

    /// Discard all history for a client, lifting any block. Returns whether
    /// anything was recorded.
    pub fn clear(&self, client_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.windows.len();
        state.windows.retain(|(client, _), _| client != client_id);
        let cleared = state.windows.len() != before;
        if cleared {
            info!(client_id, "admission history cleared");
        }
        cleared
    }

    /// Replace the limit of one category. Existing windows are kept.
    ///
    /// A zero count or window is ignored and the previous limit stays; the
    /// return value says whether the update was applied.
    pub fn update_limits(&self, category: Category, max_requests: u32, window_seconds: u64) -> bool {
        let limit = CategoryLimit::new(max_requests, window_seconds);
        if let Err(e) = limit.validate() {
            warn!(%category, max_requests, window_seconds, error = %e, "admission limit update ignored");
            return false;
        }
        self.state.lock().limits.insert(category, limit);
        info!(%category, max_requests, window_seconds, "admission limits updated");
        true
    }

    /// Number of `(client, category)` windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Current limits for every category.
    pub fn limits(&self) -> BTreeMap<Category, CategoryLimit> {
        let state = self.state.lock();
        Category::ALL.iter().map(|&c| (c, state.limit(c))).collect()
    }

    /// Drop windows that hold no in-window requests and no active block.
    /// Returns how many were discarded.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(now_ms())
    }

    /// [`prune_idle`](Self::prune_idle) evaluated at an explicit time.
    pub fn prune_idle_at(&self, now_ms: u64) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let before = state.windows.len();
        let limits = &state.limits;
        state.windows.retain(|(_, category), window| {
            let window_ms = limits
                .get(category)
                .copied()
                .unwrap_or(category.default_limit())
                .window_ms();
            window.slide(now_ms, window_ms);
            window.is_blocked(now_ms) || !window.requests.is_empty()
        });
        before - state.windows.len()
    }
}
