use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fieldmap_shared::{MapConfig, MarkerDescriptor};
use tokio::sync::RwLock;
use tracing::warn;

/// Latest successfully loaded marker feed. `markers_json` is serialized once
/// per reload and shared by every request.
#[derive(Debug, Clone)]
pub struct MarkerFeed {
    pub revision: u64,
    pub markers: Arc<Vec<MarkerDescriptor>>,
    pub markers_json: Arc<Bytes>,
    pub skipped: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Default for MarkerFeed {
    fn default() -> Self {
        Self {
            revision: 0,
            markers: Arc::new(Vec::new()),
            markers_json: Arc::new(Bytes::from_static(b"[]")),
            skipped: 0,
            loaded_at: None,
        }
    }
}

impl MarkerFeed {
    /// Build the next revision of the feed from a freshly decoded batch.
    pub fn next(&self, markers: Vec<MarkerDescriptor>, skipped: usize) -> Self {
        let markers_json = serde_json::to_vec(&markers)
            .map(Bytes::from)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to serialize marker feed");
                Bytes::from_static(b"[]")
            });
        Self {
            revision: self.revision + 1,
            markers: Arc::new(markers),
            markers_json: Arc::new(markers_json),
            skipped,
            loaded_at: Some(Utc::now()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub map_config: Arc<MapConfig>,
    pub feed: Arc<RwLock<MarkerFeed>>,
}

impl AppState {
    pub fn new(map_config: MapConfig) -> Self {
        Self {
            map_config: Arc::new(map_config),
            feed: Arc::new(RwLock::new(MarkerFeed::default())),
        }
    }
}
