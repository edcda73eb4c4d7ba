//! Outbound proxy selection.

use rand::seq::IndexedRandom;

use crate::config::{ProxyConfig, RotationMode};

/// Picks the proxy for each automation call.
///
/// The sequential cursor is owned by the pipeline worker and advanced
/// through `&mut self`, so it never needs a lock.
#[derive(Debug, Default)]
pub struct ProxySelector {
    cursor: usize,
}

impl ProxySelector {
    /// Create a selector starting at the first proxy.
    #[must_use]
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Next proxy under `config`, or `None` when proxies are disabled or the list is empty.
    pub fn select(&mut self, config: &ProxyConfig) -> Option<String> {
        if !config.enabled || config.list.is_empty() {
            return None;
        }
        match config.rotation_mode {
            RotationMode::Random => config.list.choose(&mut rand::rng()).cloned(),
            RotationMode::Sequential => {
                // the list may have shrunk since the last call
                let idx = self.cursor % config.list.len();
                self.cursor = (idx + 1) % config.list.len();
                Some(config.list[idx].clone())
            }
        }
    }
}
