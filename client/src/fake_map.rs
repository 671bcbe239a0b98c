//! In-memory `MapBackend` that records what the engine did, so view,
//! clustering and marker reconciliation can be checked without a browser.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fieldmap_shared::{ClusterBadge, ClusterOptions, IconSpec, LatLng, MarkerId, cluster_badge};

use crate::backend::{BackendError, LayerClickHandler, MapBackend, MarkerSpec};

enum LayerKind {
    Marker {
        marker_id: MarkerId,
        icon: Rc<IconSpec>,
        popup: String,
        on_click: Option<LayerClickHandler>,
    },
    Group {
        options: ClusterOptions,
        children: RefCell<Vec<FakeLayer>>,
    },
}

pub(crate) struct LayerNode {
    id: u64,
    kind: LayerKind,
}

#[derive(Clone)]
pub(crate) struct FakeLayer(Rc<LayerNode>);

impl FakeLayer {
    fn marker_id(&self) -> Option<&MarkerId> {
        match &self.0.kind {
            LayerKind::Marker { marker_id, .. } => Some(marker_id),
            LayerKind::Group { .. } => None,
        }
    }

    fn children(&self) -> Vec<FakeLayer> {
        match &self.0.kind {
            LayerKind::Group { children, .. } => children.borrow().clone(),
            LayerKind::Marker { .. } => Vec::new(),
        }
    }
}

#[derive(Default)]
struct MapState {
    attached: Vec<FakeLayer>,
    flights: Vec<(LatLng, u8)>,
    focused: Vec<MarkerId>,
    disposed: bool,
}

pub(crate) struct MapNode {
    initial_view: (LatLng, u8),
    state: RefCell<MapState>,
}

#[derive(Default)]
struct WorldState {
    next_layer: Cell<u64>,
    layers: RefCell<Vec<Weak<LayerNode>>>,
    maps: RefCell<Vec<Weak<MapNode>>>,
    fail_fly: Cell<bool>,
    fail_cluster_group: Cell<bool>,
    fail_marker: RefCell<Option<MarkerId>>,
}

/// Registry of every fake map and layer ever created, held weakly so tests
/// can assert nothing stays referenced after teardown.
#[derive(Clone, Default)]
pub(crate) struct FakeWorld(Rc<WorldState>);

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, center: LatLng, zoom: u8) -> Result<FakeMap, BackendError> {
        let node = Rc::new(MapNode {
            initial_view: (center, zoom),
            state: RefCell::new(MapState::default()),
        });
        self.0.maps.borrow_mut().push(Rc::downgrade(&node));
        Ok(FakeMap {
            node,
            world: self.clone(),
        })
    }

    pub fn fail_fly(&self, fail: bool) {
        self.0.fail_fly.set(fail);
    }

    pub fn fail_cluster_group(&self, fail: bool) {
        self.0.fail_cluster_group.set(fail);
    }

    pub fn fail_marker(&self, id: Option<MarkerId>) {
        *self.0.fail_marker.borrow_mut() = id;
    }

    pub fn live_layers(&self) -> usize {
        self.0
            .layers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn live_maps(&self) -> usize {
        self.0
            .maps
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn maps_created(&self) -> usize {
        self.0.maps.borrow().len()
    }

    /// Most recently mounted map that is still alive.
    pub fn current_map(&self) -> Option<FakeMap> {
        let node = self.0.maps.borrow().iter().rev().find_map(Weak::upgrade)?;
        Some(FakeMap {
            node,
            world: self.clone(),
        })
    }

    fn register(&self, kind: LayerKind) -> FakeLayer {
        let id = self.0.next_layer.get() + 1;
        self.0.next_layer.set(id);
        let node = Rc::new(LayerNode { id, kind });
        self.0.layers.borrow_mut().push(Rc::downgrade(&node));
        FakeLayer(node)
    }
}

#[derive(Clone)]
pub(crate) struct FakeMap {
    node: Rc<MapNode>,
    world: FakeWorld,
}

impl FakeMap {
    pub fn initial_view(&self) -> (LatLng, u8) {
        self.node.initial_view
    }

    pub fn flights(&self) -> Vec<(LatLng, u8)> {
        self.node.state.borrow().flights.clone()
    }

    pub fn focused(&self) -> Vec<MarkerId> {
        self.node.state.borrow().focused.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.node.state.borrow().disposed
    }

    /// Markers attached straight to the map (fallback mode).
    pub fn direct_markers(&self) -> Vec<MarkerId> {
        self.node
            .state
            .borrow()
            .attached
            .iter()
            .filter_map(|l| l.marker_id().cloned())
            .collect()
    }

    pub fn cluster_groups(&self) -> usize {
        self.node
            .state
            .borrow()
            .attached
            .iter()
            .filter(|l| matches!(l.0.kind, LayerKind::Group { .. }))
            .count()
    }

    /// Markers inside the attached cluster group(s).
    pub fn clustered_markers(&self) -> Vec<MarkerId> {
        self.node
            .state
            .borrow()
            .attached
            .iter()
            .flat_map(FakeLayer::children)
            .filter_map(|l| l.marker_id().cloned())
            .collect()
    }

    pub fn rendered_markers(&self) -> Vec<MarkerId> {
        let mut all = self.direct_markers();
        all.extend(self.clustered_markers());
        all
    }

    pub fn cluster_badge(&self) -> Option<ClusterBadge> {
        let state = self.node.state.borrow();
        state.attached.iter().find_map(|l| match &l.0.kind {
            LayerKind::Group { children, .. } => Some(cluster_badge(children.borrow().len())),
            LayerKind::Marker { .. } => None,
        })
    }

    pub fn cluster_options(&self) -> Option<ClusterOptions> {
        let state = self.node.state.borrow();
        state.attached.iter().find_map(|l| match &l.0.kind {
            LayerKind::Group { options, .. } => Some(options.clone()),
            LayerKind::Marker { .. } => None,
        })
    }

    fn find_marker(&self, id: &MarkerId) -> Option<FakeLayer> {
        let state = self.node.state.borrow();
        state
            .attached
            .iter()
            .flat_map(|l| {
                let mut v = vec![l.clone()];
                v.extend(l.children());
                v
            })
            .find(|l| l.marker_id() == Some(id))
    }

    /// Simulate a user click; returns false when no clickable marker matched.
    pub fn click(&self, id: &MarkerId) -> bool {
        let Some(layer) = self.find_marker(id) else {
            return false;
        };
        match &layer.0.kind {
            LayerKind::Marker {
                on_click: Some(cb), ..
            } => {
                cb();
                true
            }
            _ => false,
        }
    }

    pub fn popup(&self, id: &MarkerId) -> Option<String> {
        match &self.find_marker(id)?.0.kind {
            LayerKind::Marker { popup, .. } => Some(popup.clone()),
            LayerKind::Group { .. } => None,
        }
    }

    pub fn icon(&self, id: &MarkerId) -> Option<Rc<IconSpec>> {
        match &self.find_marker(id)?.0.kind {
            LayerKind::Marker { icon, .. } => Some(icon.clone()),
            LayerKind::Group { .. } => None,
        }
    }
}

impl MapBackend for FakeMap {
    type Layer = FakeLayer;

    fn fly_to(&self, center: LatLng, zoom: u8) -> Result<(), BackendError> {
        if self.world.0.fail_fly.get() {
            return Err("flyTo: map container is not sized".into());
        }
        self.node.state.borrow_mut().flights.push((center, zoom));
        Ok(())
    }

    fn create_marker(
        &self,
        spec: &MarkerSpec<'_>,
        on_click: Option<LayerClickHandler>,
    ) -> Result<FakeLayer, BackendError> {
        if self.world.0.fail_marker.borrow().as_ref() == Some(spec.id) {
            return Err(format!("cannot build marker {}", spec.id).into());
        }
        Ok(self.world.register(LayerKind::Marker {
            marker_id: spec.id.clone(),
            icon: spec.icon.clone(),
            popup: spec.popup_html.clone(),
            on_click,
        }))
    }

    fn create_cluster_group(&self, options: &ClusterOptions) -> Result<FakeLayer, BackendError> {
        if self.world.0.fail_cluster_group.get() {
            return Err("markerClusterGroup is not a function".into());
        }
        Ok(self.world.register(LayerKind::Group {
            options: options.clone(),
            children: RefCell::new(Vec::new()),
        }))
    }

    fn attach_layer(&self, layer: &FakeLayer) {
        let mut state = self.node.state.borrow_mut();
        if !state.attached.iter().any(|l| l.0.id == layer.0.id) {
            state.attached.push(layer.clone());
        }
    }

    fn detach_layer(&self, layer: &FakeLayer) {
        self.node
            .state
            .borrow_mut()
            .attached
            .retain(|l| l.0.id != layer.0.id);
    }

    fn add_to_group(&self, group: &FakeLayer, children: &[FakeLayer]) {
        if let LayerKind::Group { children: held, .. } = &group.0.kind {
            held.borrow_mut().extend(children.iter().cloned());
        }
    }

    fn clear_group(&self, group: &FakeLayer) {
        if let LayerKind::Group { children, .. } = &group.0.kind {
            children.borrow_mut().clear();
        }
    }

    fn focus_layer(&self, _group: Option<&FakeLayer>, layer: &FakeLayer) {
        if let Some(id) = layer.marker_id() {
            self.node.state.borrow_mut().focused.push(id.clone());
        }
    }

    fn dispose(&self) {
        let mut state = self.node.state.borrow_mut();
        state.attached.clear();
        state.disposed = true;
    }
}
