use std::rc::Rc;

use chrono::{DateTime, FixedOffset};
use fieldmap_shared::{IconFactory, MarkerDescriptor, MarkerId, dedupe_last_wins, render_popup};

use crate::backend::{LayerClickHandler, MapBackend, MarkerClickHandler, MarkerSpec};

/// Where a pass should put its markers.
pub enum RenderTarget<'a, L> {
    /// Clustering not resolved yet: render nothing.
    Pending,
    Cluster(&'a L),
    Direct,
}

/// Inputs of one synchronization pass.
pub struct SyncPass<'a> {
    pub markers: &'a [MarkerDescriptor],
    pub on_click: Option<&'a MarkerClickHandler>,
    pub now: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub rendered: usize,
    pub removed: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

enum Placement<L> {
    Empty,
    Cluster(L),
    Direct,
}

/// Owns the rendered layer set: exactly one layer per current descriptor,
/// either inside the cluster layer or attached straight to the map.
pub struct MarkerSynchronizer<L> {
    rendered: Vec<(MarkerId, L)>,
    placement: Placement<L>,
    passes: u64,
}

impl<L: Clone> Default for MarkerSynchronizer<L> {
    fn default() -> Self {
        Self {
            rendered: Vec::new(),
            placement: Placement::Empty,
            passes: 0,
        }
    }
}

impl<L: Clone> MarkerSynchronizer<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn layer_for(&self, id: &MarkerId) -> Option<&L> {
        self.rendered
            .iter()
            .find(|(rendered_id, _)| rendered_id == id)
            .map(|(_, layer)| layer)
    }

    pub fn sync<B>(
        &mut self,
        backend: &B,
        icons: &mut IconFactory,
        target: RenderTarget<'_, L>,
        pass: SyncPass<'_>,
    ) -> SyncReport
    where
        B: MapBackend<Layer = L>,
    {
        self.passes += 1;
        let mut report = SyncReport {
            removed: self.clear(backend),
            ..SyncReport::default()
        };
        if matches!(target, RenderTarget::Pending) {
            return report;
        }

        let (unique, duplicates) = dedupe_last_wins(pass.markers);
        report.duplicates = duplicates;
        if duplicates > 0 {
            tracing::warn!(duplicates, "duplicate marker ids; keeping the last of each");
        }

        let mut built: Vec<(MarkerId, L)> = Vec::with_capacity(unique.len());
        for marker in unique {
            if !marker.position.is_valid() {
                tracing::warn!(
                    id = %marker.id,
                    lat = marker.position.lat,
                    lng = marker.position.lng,
                    "skipping marker with invalid position"
                );
                report.skipped += 1;
                continue;
            }

            let spec = MarkerSpec {
                id: &marker.id,
                position: marker.position,
                icon: icons.icon_for(marker),
                popup_html: render_popup(marker, &pass.now),
                title: marker.label.as_deref(),
            };
            let on_click = pass.on_click.map(|handler| {
                let handler = handler.clone();
                let descriptor = marker.clone();
                Rc::new(move || handler(&descriptor)) as LayerClickHandler
            });

            match backend.create_marker(&spec, on_click) {
                Ok(layer) => built.push((marker.id.clone(), layer)),
                Err(e) => {
                    tracing::warn!(id = %marker.id, error = %e, "failed to build marker layer");
                    report.skipped += 1;
                }
            }
        }

        match target {
            RenderTarget::Cluster(group) => {
                backend.clear_group(group);
                let children: Vec<L> = built.iter().map(|(_, layer)| layer.clone()).collect();
                backend.add_to_group(group, &children);
                self.placement = Placement::Cluster(group.clone());
            }
            RenderTarget::Direct => {
                for (_, layer) in &built {
                    backend.attach_layer(layer);
                }
                self.placement = Placement::Direct;
            }
            RenderTarget::Pending => {}
        }

        report.rendered = built.len();
        self.rendered = built;
        report
    }

    /// Remove every layer from the previous pass. Returns how many went.
    pub fn clear<B>(&mut self, backend: &B) -> usize
    where
        B: MapBackend<Layer = L>,
    {
        match std::mem::replace(&mut self.placement, Placement::Empty) {
            Placement::Cluster(group) => backend.clear_group(&group),
            Placement::Direct => {
                for (_, layer) in &self.rendered {
                    backend.detach_layer(layer);
                }
            }
            Placement::Empty => {}
        }
        let removed = self.rendered.len();
        self.rendered.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use chrono::TimeZone;
    use fieldmap_shared::{ClusterOptions, ClusterTier, IconKey, LatLng, MarkerVariant};

    use crate::fake_map::{FakeLayer, FakeMap, FakeWorld};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .unwrap()
    }

    fn scenario() -> Vec<MarkerDescriptor> {
        vec![
            MarkerDescriptor::new(1, LatLng::new(19.0, 72.8)).with_variant(MarkerVariant::Current),
            MarkerDescriptor::new(2, LatLng::new(19.1, 72.9)).with_variant(MarkerVariant::Home),
            MarkerDescriptor::new(3, LatLng::new(19.2, 73.0)).with_ordinal(1),
        ]
    }

    fn many(n: i64) -> Vec<MarkerDescriptor> {
        (0..n)
            .map(|i| MarkerDescriptor::new(i, LatLng::new(18.9 + i as f64 * 0.001, 72.8)))
            .collect()
    }

    fn ids(markers: &[MarkerDescriptor]) -> Vec<MarkerId> {
        markers.iter().map(|m| m.id.clone()).collect()
    }

    struct Harness {
        world: FakeWorld,
        map: FakeMap,
        group: Option<FakeLayer>,
        icons: IconFactory,
        sync: MarkerSynchronizer<FakeLayer>,
    }

    impl Harness {
        fn new(clustered: bool) -> Self {
            let world = FakeWorld::new();
            let map = world.mount(LatLng::new(19.0, 72.8), 11).unwrap();
            let group = clustered.then(|| {
                let g = map.create_cluster_group(&ClusterOptions::default()).unwrap();
                map.attach_layer(&g);
                g
            });
            Self {
                world,
                map,
                group,
                icons: IconFactory::default(),
                sync: MarkerSynchronizer::new(),
            }
        }

        fn run(
            &mut self,
            markers: &[MarkerDescriptor],
            on_click: Option<&MarkerClickHandler>,
        ) -> SyncReport {
            let target = match &self.group {
                Some(g) => RenderTarget::Cluster(g),
                None => RenderTarget::Direct,
            };
            self.sync.sync(
                &self.map,
                &mut self.icons,
                target,
                SyncPass {
                    markers,
                    on_click,
                    now: now(),
                },
            )
        }
    }

    #[test]
    fn clustered_scenario_puts_three_markers_in_one_small_cluster() {
        let mut h = Harness::new(true);
        let report = h.run(&scenario(), None);

        assert_eq!(report.rendered, 3);
        assert_eq!(h.map.cluster_groups(), 1);
        assert_eq!(h.map.clustered_markers(), ids(&scenario()));
        assert!(h.map.direct_markers().is_empty());
        let badge = h.map.cluster_badge().unwrap();
        assert_eq!(badge.count, 3);
        assert_eq!(badge.tier, ClusterTier::Small);
        assert!(badge.html.contains(">3<"));
    }

    #[test]
    fn fallback_scenario_renders_clickable_individual_markers() {
        let mut h = Harness::new(false);
        let clicked: Rc<RefCell<Vec<MarkerDescriptor>>> = Rc::default();
        let sink = clicked.clone();
        let handler: MarkerClickHandler = Rc::new(move |d| sink.borrow_mut().push(d.clone()));

        h.run(&scenario(), Some(&handler));

        assert_eq!(h.map.direct_markers(), ids(&scenario()));
        assert!(h.map.cluster_badge().is_none());
        assert!(h.map.click(&MarkerId::Num(2)));
        let clicked = clicked.borrow();
        assert_eq!(clicked.len(), 1);
        assert_eq!(clicked[0].id, MarkerId::Num(2));
        assert_eq!(clicked[0].variant, Some(MarkerVariant::Home));
    }

    #[test]
    fn fallback_markers_carry_icons_and_popups() {
        let mut h = Harness::new(false);
        let markers = scenario();
        h.run(&markers, None);

        for m in &markers {
            let icon = h.map.icon(&m.id).unwrap();
            assert_eq!(icon.key, IconKey::for_marker(m).cache_key());
            assert_eq!(h.map.popup(&m.id).unwrap(), render_popup(m, &now()));
        }
        assert!(h.map.popup(&MarkerId::Num(2)).unwrap().contains(">Home</span>"));
        // No handler supplied, so nothing is clickable.
        assert!(!h.map.click(&MarkerId::Num(1)));
    }

    #[test]
    fn shrinking_list_leaves_exactly_the_survivors() {
        for clustered in [true, false] {
            let mut h = Harness::new(clustered);
            let big = many(50);
            h.run(&big, None);
            assert_eq!(h.map.rendered_markers().len(), 50);

            let small = vec![big[7].clone(), big[31].clone()];
            let report = h.run(&small, None);
            assert_eq!(report.removed, 50);
            assert_eq!(report.rendered, 2);
            assert_eq!(h.map.rendered_markers(), ids(&small));
            assert_eq!(h.sync.len(), 2);

            let group_layers = usize::from(clustered);
            assert_eq!(h.world.live_layers(), 2 + group_layers);
        }
    }

    #[test]
    fn duplicate_ids_resolve_last_wins() {
        let mut h = Harness::new(false);
        let markers = vec![
            MarkerDescriptor::new(1, LatLng::new(19.0, 72.8)).with_label("stale"),
            MarkerDescriptor::new(2, LatLng::new(19.1, 72.8)),
            MarkerDescriptor::new(1, LatLng::new(19.2, 72.8)).with_label("fresh"),
        ];
        let report = h.run(&markers, None);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rendered, 2);
        assert_eq!(h.map.direct_markers(), vec![MarkerId::Num(2), MarkerId::Num(1)]);
        assert!(h.map.popup(&MarkerId::Num(1)).unwrap().contains("fresh"));
    }

    #[test]
    fn invalid_positions_are_skipped() {
        let mut h = Harness::new(true);
        let markers = vec![
            MarkerDescriptor::new(1, LatLng::new(f64::NAN, 72.8)),
            MarkerDescriptor::new(2, LatLng::new(19.1, 72.8)),
            MarkerDescriptor::new(3, LatLng::new(19.1, f64::INFINITY)),
        ];
        let report = h.run(&markers, None);
        assert_eq!(report.skipped, 2);
        assert_eq!(h.map.clustered_markers(), vec![MarkerId::Num(2)]);
    }

    #[test]
    fn backend_failure_for_one_marker_spares_the_rest() {
        let mut h = Harness::new(false);
        h.world.fail_marker(Some(MarkerId::Num(2)));
        let report = h.run(&scenario(), None);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.map.direct_markers(), vec![MarkerId::Num(1), MarkerId::Num(3)]);
    }

    #[test]
    fn pending_target_renders_nothing_and_clears_leftovers() {
        let mut h = Harness::new(false);
        h.run(&scenario(), None);
        let report = h.sync.sync(
            &h.map,
            &mut h.icons,
            RenderTarget::Pending,
            SyncPass {
                markers: &scenario(),
                on_click: None,
                now: now(),
            },
        );
        assert_eq!(report.removed, 3);
        assert_eq!(report.rendered, 0);
        assert!(h.map.rendered_markers().is_empty());
        assert!(h.sync.is_empty());
    }

    #[test]
    fn switching_from_direct_to_cluster_detaches_direct_markers() {
        let mut h = Harness::new(false);
        h.run(&scenario(), None);
        let group = h.map.create_cluster_group(&ClusterOptions::default()).unwrap();
        h.map.attach_layer(&group);
        h.sync.sync(
            &h.map,
            &mut h.icons,
            RenderTarget::Cluster(&group),
            SyncPass {
                markers: &scenario(),
                on_click: None,
                now: now(),
            },
        );
        assert!(h.map.direct_markers().is_empty());
        assert_eq!(h.map.clustered_markers().len(), 3);
    }

    #[test]
    fn clear_releases_every_layer() {
        let mut h = Harness::new(true);
        h.run(&many(20), None);
        assert_eq!(h.sync.clear(&h.map), 20);
        assert!(h.map.rendered_markers().is_empty());
        // Only the cluster group itself is still referenced.
        assert_eq!(h.world.live_layers(), 1);
    }

    #[test]
    fn icons_are_reused_across_passes() {
        let mut h = Harness::new(true);
        h.run(&scenario(), None);
        let first = h.map.icon(&MarkerId::Num(1)).unwrap();
        h.run(&scenario(), None);
        let second = h.map.icon(&MarkerId::Num(1)).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(h.icons.len(), 3);
        assert_eq!(h.sync.passes(), 2);
    }
}
