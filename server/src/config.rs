use std::path::PathBuf;
use std::time::Duration;

use fieldmap_shared::MapConfig;
use fieldmap_shared::config::{
    DEFAULT_ATTRIBUTION, DEFAULT_CLUSTER_SCRIPT_URL, DEFAULT_TILE_URL,
};

pub const SERVER_PORT: u16 = 3000;
pub const DEFAULT_MARKERS_FILE: &str = "data/markers.json";
pub const DEFAULT_MARKERS_REFRESH_SECS: u64 = 30;
pub const DEFAULT_STATIC_DIR: &str = "client/dist";
pub const MAX_SUPPORTED_ZOOM: u8 = 22;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

pub fn server_port() -> u16 {
    env_string("SERVER_PORT")
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(SERVER_PORT)
}

pub fn tile_url_template() -> String {
    env_string("TILE_URL_TEMPLATE")
        .filter(|value| value.contains("{z}") && value.contains("{x}") && value.contains("{y}"))
        .unwrap_or_else(|| DEFAULT_TILE_URL.to_owned())
}

pub fn tile_attribution() -> String {
    env_string("TILE_ATTRIBUTION").unwrap_or_else(|| DEFAULT_ATTRIBUTION.to_owned())
}

pub fn map_max_zoom() -> Option<u8> {
    env_string("MAP_MAX_ZOOM")
        .and_then(|value| value.parse::<u8>().ok())
        .filter(|value| (1..=MAX_SUPPORTED_ZOOM).contains(value))
}

pub fn cluster_script_url() -> String {
    env_string("CLUSTER_SCRIPT_URL").unwrap_or_else(|| DEFAULT_CLUSTER_SCRIPT_URL.to_owned())
}

pub fn markers_file() -> PathBuf {
    env_string("MARKERS_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MARKERS_FILE))
}

pub fn markers_refresh_interval() -> Duration {
    env_string("MARKERS_REFRESH_SECS")
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_MARKERS_REFRESH_SECS))
}

pub fn static_dir() -> PathBuf {
    env_string("STATIC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR))
}

/// Map settings handed to the browser, assembled from the environment.
pub fn map_config() -> MapConfig {
    let mut config = MapConfig {
        tile_url: tile_url_template(),
        attribution: tile_attribution(),
        feed_refresh_secs: u32::try_from(markers_refresh_interval().as_secs()).unwrap_or(u32::MAX),
        ..MapConfig::default()
    };
    if let Some(max_zoom) = map_max_zoom() {
        config.max_zoom = max_zoom;
        config.min_zoom = config.min_zoom.min(max_zoom);
        config.initial_zoom = config.clamp_zoom(config.initial_zoom);
    }
    config.cluster.script_url = cluster_script_url();
    config
}
