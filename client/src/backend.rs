use std::fmt;
use std::rc::Rc;

use fieldmap_shared::{ClusterOptions, IconSpec, LatLng, MarkerDescriptor, MarkerId};

/// Invoked with the originating descriptor when a rendered marker is clicked.
pub type MarkerClickHandler = Rc<dyn Fn(&MarkerDescriptor)>;

/// Per-layer click callback handed to the backend.
pub type LayerClickHandler = Rc<dyn Fn()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(value: String) -> Self {
        BackendError(value)
    }
}

impl From<&str> for BackendError {
    fn from(value: &str) -> Self {
        BackendError(value.to_owned())
    }
}

/// Everything the backend needs to build one marker layer.
pub struct MarkerSpec<'a> {
    pub id: &'a MarkerId,
    pub position: LatLng,
    pub icon: Rc<IconSpec>,
    pub popup_html: String,
    pub title: Option<&'a str>,
}

/// The only surface through which the widget touches the imperative map
/// library. One backend value owns exactly one live map instance.
pub trait MapBackend {
    /// Handle to a marker or group layer. Dropping the last clone releases
    /// any callbacks bound to it.
    type Layer: Clone;

    /// Animated transition to a new view.
    fn fly_to(&self, center: LatLng, zoom: u8) -> Result<(), BackendError>;

    fn create_marker(
        &self,
        spec: &MarkerSpec<'_>,
        on_click: Option<LayerClickHandler>,
    ) -> Result<Self::Layer, BackendError>;

    /// Requires the clustering extension to be present.
    fn create_cluster_group(&self, options: &ClusterOptions) -> Result<Self::Layer, BackendError>;

    fn attach_layer(&self, layer: &Self::Layer);

    fn detach_layer(&self, layer: &Self::Layer);

    /// Batched insertion into a group layer.
    fn add_to_group(&self, group: &Self::Layer, children: &[Self::Layer]);

    fn clear_group(&self, group: &Self::Layer);

    /// Bring a marker into view and open its popup. `group` is the cluster
    /// layer holding it, if any.
    fn focus_layer(&self, group: Option<&Self::Layer>, layer: &Self::Layer);

    /// Tear down the map instance itself.
    fn dispose(&self);
}
