pub mod cluster;
pub mod colors;
pub mod config;
pub mod icons;
pub mod marker;
pub mod popup;
pub mod time_format;

pub use cluster::{ClusterBadge, ClusterOptions, ClusterTier, cluster_badge};
pub use config::MapConfig;
pub use icons::{IconFactory, IconKey, IconSpec};
pub use marker::*;
pub use popup::render_popup;
