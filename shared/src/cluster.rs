use serde::{Deserialize, Serialize};

/// Visual size bucket for a cluster badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTier {
    Small,
    Medium,
    Large,
}

impl ClusterTier {
    pub fn for_count(count: usize) -> Self {
        match count {
            0..=9 => ClusterTier::Small,
            10..=99 => ClusterTier::Medium,
            _ => ClusterTier::Large,
        }
    }

    pub fn class_name(self) -> &'static str {
        match self {
            ClusterTier::Small => "marker-cluster-small",
            ClusterTier::Medium => "marker-cluster-medium",
            ClusterTier::Large => "marker-cluster-large",
        }
    }

    pub fn diameter(self) -> u32 {
        match self {
            ClusterTier::Small => 36,
            ClusterTier::Medium => 42,
            ClusterTier::Large => 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterBadge {
    pub count: usize,
    pub tier: ClusterTier,
    pub html: String,
    pub class_name: String,
    pub size: u32,
}

pub fn cluster_badge(count: usize) -> ClusterBadge {
    let tier = ClusterTier::for_count(count);
    ClusterBadge {
        count,
        tier,
        html: format!("<div><span>{count}</span></div>"),
        class_name: format!("marker-cluster {}", tier.class_name()),
        size: tier.diameter(),
    }
}

/// Options handed to the clustering layer. Field names match the
/// `L.markerClusterGroup` option object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterOptions {
    pub chunked_loading: bool,
    pub chunk_interval: u32,
    pub chunk_delay: u32,
    pub max_cluster_radius: u32,
    pub show_coverage_on_hover: bool,
    pub spiderfy_on_max_zoom: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            chunked_loading: true,
            chunk_interval: 200,
            chunk_delay: 50,
            max_cluster_radius: 60,
            show_coverage_on_hover: false,
            spiderfy_on_max_zoom: true,
        }
    }
}
