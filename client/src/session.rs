use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, Local};
use fieldmap_shared::{IconFactory, LatLng, MapConfig, MarkerDescriptor, MarkerId, MarkerSignature};

use crate::backend::{BackendError, MapBackend, MarkerClickHandler};
use crate::cluster::{ClusterManager, ClusterPhase, LoadResolution, LoadTicket};
use crate::markers::{MarkerSynchronizer, RenderTarget, SyncPass, SyncReport};
use crate::view::{ViewController, ViewUpdate};

pub type Clock = Rc<dyn Fn() -> DateTime<FixedOffset>>;

/// Props of one widget render.
pub struct MapInputs<'a> {
    pub center: LatLng,
    pub zoom: u8,
    pub markers: &'a [MarkerDescriptor],
    pub highlighted: Option<&'a MarkerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A fresh map was created; the caller must load the clustering
    /// extension and report back with this ticket.
    Mounted(LoadTicket),
    Updated,
    Failed,
}

/// Everything that lives exactly as long as one underlying map.
struct MapInstance<B: MapBackend> {
    backend: B,
    mount_id: u64,
    view: ViewController,
    cluster: ClusterManager<B::Layer>,
    markers: MarkerSynchronizer<B::Layer>,
    focused: Option<MarkerId>,
}

/// Framework-independent core of the map widget.
///
/// Remounts the map whenever the marker signature changes, otherwise only
/// forwards view and highlight updates. Marker passes run when clustering
/// resolves for the current mount and always read the latest marker list.
pub struct MapSession<B: MapBackend> {
    config: MapConfig,
    icons: IconFactory,
    clock: Clock,
    next_mount: u64,
    instance: Option<MapInstance<B>>,
    markers: Vec<MarkerDescriptor>,
    signature: MarkerSignature,
    highlighted: Option<MarkerId>,
    passes: u64,
    click_slot: Rc<RefCell<Option<MarkerClickHandler>>>,
    forward_click: MarkerClickHandler,
}

impl<B: MapBackend> MapSession<B> {
    pub fn new(config: MapConfig) -> Self {
        let click_slot: Rc<RefCell<Option<MarkerClickHandler>>> = Rc::default();
        let slot = click_slot.clone();
        let forward_click: MarkerClickHandler = Rc::new(move |marker: &MarkerDescriptor| {
            let handler = slot.borrow().clone();
            if let Some(handler) = handler {
                handler(marker);
            }
        });
        Self {
            config,
            icons: IconFactory::default(),
            clock: Rc::new(|| Local::now().fixed_offset()),
            next_mount: 0,
            instance: None,
            markers: Vec::new(),
            signature: MarkerSignature::default(),
            highlighted: None,
            passes: 0,
            click_slot,
            forward_click,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.instance.is_some()
    }

    pub fn mount_id(&self) -> Option<u64> {
        self.instance.as_ref().map(|i| i.mount_id)
    }

    pub fn phase(&self) -> Option<ClusterPhase> {
        self.instance.as_ref().map(|i| i.cluster.phase())
    }

    pub fn rendered_count(&self) -> usize {
        self.instance.as_ref().map_or(0, |i| i.markers.len())
    }

    /// Synchronization passes run over the session's lifetime.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn set_click_handler(&mut self, handler: Option<MarkerClickHandler>) {
        *self.click_slot.borrow_mut() = handler;
    }

    pub fn render<F>(&mut self, inputs: MapInputs<'_>, mount: F) -> RenderOutcome
    where
        F: FnOnce(LatLng, u8) -> Result<B, BackendError>,
    {
        let signature = MarkerSignature::of(inputs.markers);
        self.markers = inputs.markers.to_vec();
        self.highlighted = inputs.highlighted.cloned();
        let zoom = self.config.clamp_zoom(inputs.zoom);

        if self.instance.is_some() && signature == self.signature {
            self.set_view(inputs.center, zoom);
            self.focus_highlighted();
            return RenderOutcome::Updated;
        }

        self.unmount();
        self.signature = signature;

        let center = if inputs.center.is_valid() {
            inputs.center
        } else {
            tracing::warn!(
                lat = inputs.center.lat,
                lng = inputs.center.lng,
                "invalid center on mount, using configured default"
            );
            self.config.initial_center
        };
        let backend = match mount(center, zoom) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create map");
                return RenderOutcome::Failed;
            }
        };

        self.next_mount += 1;
        let mount_id = self.next_mount;
        let mut cluster = ClusterManager::new(mount_id, self.config.cluster.options.clone());
        let Some(ticket) = cluster.begin_load() else {
            backend.dispose();
            return RenderOutcome::Failed;
        };
        tracing::debug!(mount = mount_id, markers = self.markers.len(), "map mounted");

        self.instance = Some(MapInstance {
            backend,
            mount_id,
            view: ViewController::new(Some((center, zoom))),
            cluster,
            markers: MarkerSynchronizer::new(),
            focused: None,
        });
        RenderOutcome::Mounted(ticket)
    }

    /// Keep the latest list for the next pass. Does not render by itself.
    pub fn set_markers(&mut self, markers: &[MarkerDescriptor]) {
        self.markers = markers.to_vec();
    }

    pub fn set_view(&mut self, center: LatLng, zoom: u8) -> Option<ViewUpdate> {
        let zoom = self.config.clamp_zoom(zoom);
        let instance = self.instance.as_mut()?;
        Some(instance.view.apply(&instance.backend, center, zoom))
    }

    /// Returns true when a marker was brought into focus.
    pub fn set_highlight(&mut self, id: Option<MarkerId>) -> bool {
        self.highlighted = id;
        self.focus_highlighted()
    }

    pub fn cluster_resolved(
        &mut self,
        ticket: LoadTicket,
        outcome: Result<(), String>,
    ) -> LoadResolution {
        let Some(instance) = self.instance.as_mut() else {
            tracing::debug!(mount = ticket.mount_id(), "map gone before clustering resolved");
            return LoadResolution::Discarded;
        };
        let resolution = instance.cluster.resolve(&instance.backend, ticket, outcome);
        if matches!(resolution, LoadResolution::Applied(_)) {
            self.sync();
            self.focus_highlighted();
        }
        resolution
    }

    /// Rebuild the rendered layer set from the latest marker list.
    pub fn sync(&mut self) -> Option<SyncReport> {
        let instance = self.instance.as_mut()?;
        let target = match (instance.cluster.phase(), instance.cluster.layer()) {
            (ClusterPhase::Loaded, Some(layer)) => RenderTarget::Cluster(layer),
            (ClusterPhase::FailedToLoad, _) => RenderTarget::Direct,
            _ => RenderTarget::Pending,
        };
        let report = instance.markers.sync(
            &instance.backend,
            &mut self.icons,
            target,
            SyncPass {
                markers: &self.markers,
                // The slot is read at click time, so handlers set later still fire.
                on_click: Some(&self.forward_click),
                now: (self.clock)(),
            },
        );
        instance.focused = None;
        self.passes += 1;
        tracing::debug!(
            rendered = report.rendered,
            removed = report.removed,
            skipped = report.skipped,
            "markers synchronized"
        );
        Some(report)
    }

    fn focus_highlighted(&mut self) -> bool {
        let Some(instance) = self.instance.as_mut() else {
            return false;
        };
        let Some(id) = self.highlighted.as_ref() else {
            instance.focused = None;
            return false;
        };
        if instance.focused.as_ref() == Some(id) {
            return false;
        }
        let Some(layer) = instance.markers.layer_for(id) else {
            return false;
        };
        instance.backend.focus_layer(instance.cluster.layer(), layer);
        instance.focused = Some(id.clone());
        true
    }

    /// Release every layer and the map itself.
    pub fn unmount(&mut self) {
        let Some(mut instance) = self.instance.take() else {
            return;
        };
        instance.markers.clear(&instance.backend);
        instance.cluster.teardown(&instance.backend);
        instance.backend.dispose();
        tracing::debug!(mount = instance.mount_id, "map unmounted");
    }
}

impl<B: MapBackend> Drop for MapSession<B> {
    fn drop(&mut self) {
        self.unmount();
    }
}
