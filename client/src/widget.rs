use std::cell::RefCell;
use std::rc::Rc;

use fieldmap_shared::{LatLng, MapConfig, MarkerDescriptor, MarkerId, MarkerSignature};
use leptos::html::Div;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::extension::load_marker_cluster;
use crate::leaflet::LeafletBackend;
use crate::session::{MapInputs, MapSession, RenderOutcome};

/// Live map of `markers`. A new underlying map is created whenever the
/// marker signature changes; view and highlight changes reuse it.
#[component]
pub fn MapWidget(
    config: MapConfig,
    #[prop(into)] center: Signal<LatLng>,
    #[prop(into)] zoom: Signal<u8>,
    #[prop(into)] markers: Signal<Vec<MarkerDescriptor>>,
    #[prop(into)] highlighted_id: Signal<Option<MarkerId>>,
    #[prop(optional)] on_marker_click: Option<Callback<MarkerDescriptor>>,
) -> impl IntoView {
    let container = NodeRef::<Div>::new();
    let ready = RwSignal::new(false);
    let signature = Memo::new(move |_| markers.with(|m| MarkerSignature::of(m)));

    let cluster_config = config.cluster.clone();
    let session = Rc::new(RefCell::new(MapSession::<LeafletBackend>::new(config)));
    if let Some(callback) = on_marker_click {
        session
            .borrow_mut()
            .set_click_handler(Some(Rc::new(move |marker: &MarkerDescriptor| {
                callback.run(marker.clone())
            })));
    }

    // Mount, or remount on signature change.
    {
        let session = session.clone();
        Effect::new(move |_| {
            signature.track();
            let Some(el) = container.get() else {
                return;
            };
            let outcome = markers.with_untracked(|list| {
                let highlighted = highlighted_id.get_untracked();
                let mut s = session.borrow_mut();
                let tile_config = s.config().clone();
                s.render(
                    MapInputs {
                        center: center.get_untracked(),
                        zoom: zoom.get_untracked(),
                        markers: list,
                        highlighted: highlighted.as_ref(),
                    },
                    |c, z| LeafletBackend::mount(&el, &tile_config, c, z),
                )
            });

            match outcome {
                RenderOutcome::Mounted(ticket) => {
                    ready.set(true);
                    let weak = Rc::downgrade(&session);
                    let cluster_config = cluster_config.clone();
                    spawn_local(async move {
                        let result = load_marker_cluster(&cluster_config).await;
                        let Some(session) = weak.upgrade() else {
                            tracing::debug!("map widget gone before clustering resolved");
                            return;
                        };
                        session.borrow_mut().cluster_resolved(ticket, result);
                    });
                }
                RenderOutcome::Updated => {}
                RenderOutcome::Failed => ready.set(false),
            }
        });
    }

    {
        let session = session.clone();
        Effect::new(move |_| {
            markers.with(|list| session.borrow_mut().set_markers(list));
        });
    }

    {
        let session = session.clone();
        Effect::new(move |_| {
            let (c, z) = (center.get(), zoom.get());
            session.borrow_mut().set_view(c, z);
        });
    }

    Effect::new(move |_| {
        let id = highlighted_id.get();
        session.borrow_mut().set_highlight(id);
    });

    view! {
        <div class="fm-map">
            <div class="fm-map-canvas" node_ref=container></div>
            <Show when=move || !ready.get()>
                <div class="fm-map-loading">
                    <div class="fm-map-loading-spinner"></div>
                    <span>"Loading map"</span>
                </div>
            </Show>
        </div>
    }
}
