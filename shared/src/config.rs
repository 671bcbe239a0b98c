use serde::{Deserialize, Serialize};

use crate::cluster::ClusterOptions;
use crate::marker::LatLng;

pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const DEFAULT_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";
pub const DEFAULT_CLUSTER_SCRIPT_URL: &str =
    "https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js";
pub const DEFAULT_CLUSTER_STYLE_URLS: [&str; 2] = [
    "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css",
    "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css",
];
pub const DEFAULT_CENTER: LatLng = LatLng::new(19.076, 72.8777);
pub const DEFAULT_ZOOM: u8 = 11;

/// Where the clustering extension is fetched from and how its layer is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    pub script_url: String,
    pub style_urls: Vec<String>,
    pub options: ClusterOptions,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            script_url: DEFAULT_CLUSTER_SCRIPT_URL.to_owned(),
            style_urls: DEFAULT_CLUSTER_STYLE_URLS.iter().map(|s| s.to_string()).collect(),
            options: ClusterOptions::default(),
        }
    }
}

/// Map settings served by the host at `/api/map/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub tile_url: String,
    pub attribution: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub initial_center: LatLng,
    pub initial_zoom: u8,
    pub cluster: ClusterConfig,
    pub feed_refresh_secs: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_url: DEFAULT_TILE_URL.to_owned(),
            attribution: DEFAULT_ATTRIBUTION.to_owned(),
            min_zoom: 2,
            max_zoom: 19,
            initial_center: DEFAULT_CENTER,
            initial_zoom: DEFAULT_ZOOM,
            cluster: ClusterConfig::default(),
            feed_refresh_secs: 30,
        }
    }
}

impl MapConfig {
    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        let (lo, hi) = if self.min_zoom <= self.max_zoom {
            (self.min_zoom, self.max_zoom)
        } else {
            (self.max_zoom, self.min_zoom)
        };
        zoom.clamp(lo, hi)
    }
}
