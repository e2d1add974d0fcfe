//! Service-oriented application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state. Immutable infrastructure sits in `Arc`s; runtime-mutable
//! settings live in a [`ConfigStore`] behind `RwLock`s.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use cur_core::config::{Config, QualityThresholds};
use cur_core::events::EventBus;
use cur_db::pool::DbPool;

use crate::scheduler::JobScheduler;

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Mutable runtime configuration that can be updated via API and persisted.
///
/// The quality thresholds live here so replacing them takes effect on the
/// next classification pass without restarting; a write swaps the whole set
/// at once.
#[derive(Debug)]
pub struct ConfigStore {
    quality: RwLock<QualityThresholds>,
    /// Path for persistence (None = no persistence).
    config_path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: &Config, config_path: Option<PathBuf>) -> Self {
        Self {
            quality: RwLock::new(config.quality),
            config_path,
        }
    }

    /// Snapshot of the current thresholds.
    pub fn quality_thresholds(&self) -> QualityThresholds {
        *self.quality.read()
    }

    /// Replace the thresholds wholesale.
    pub fn set_quality_thresholds(&self, thresholds: QualityThresholds) {
        *self.quality.write() = thresholds;
    }

    /// Persist the mutable config sections back to the file.
    ///
    /// Best-effort; errors are logged but not propagated.
    pub fn persist(&self) {
        let Some(ref path) = self.config_path else {
            return;
        };

        let mut map = serde_json::Map::new();
        if let Ok(v) = serde_json::to_value(self.quality_thresholds()) {
            map.insert("quality".into(), v);
        }
        let snapshot = serde_json::Value::Object(map);

        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!("Failed to persist config to {}: {e}", path.display());
                }
            }
            Err(e) => {
                tracing::warn!("Failed to serialize config: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Application context shared by all request handlers (via Axum state).
///
/// Cheaply cloneable; it only holds `Arc`s and pool handles.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Mutable runtime configuration.
    pub config_store: Arc<ConfigStore>,
    /// Broadcast event bus for SSE.
    pub event_bus: Arc<EventBus>,
    /// The single-flight job scheduler.
    pub scheduler: JobScheduler,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cur_core::config::TierCutoffs;

    #[test]
    fn threshold_swap_is_whole_set() {
        let store = ConfigStore::new(&Config::default(), None);
        assert_eq!(store.quality_thresholds().hd1080.medium_kbps, 4_000);

        let mut updated = store.quality_thresholds();
        updated.hd1080 = TierCutoffs {
            medium_kbps: 5_000,
            high_kbps: 10_000,
        };
        store.set_quality_thresholds(updated);

        let current = store.quality_thresholds();
        assert_eq!(current.hd1080.medium_kbps, 5_000);
        assert_eq!(current.sd.medium_kbps, 1_000);
    }

    #[test]
    fn persist_without_path_is_noop() {
        let store = ConfigStore::new(&Config::default(), None);
        store.persist();
    }

    #[test]
    fn persist_writes_quality_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&Config::default(), Some(path.clone()));
        store.persist();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(value.get("quality").is_some());
    }
}
