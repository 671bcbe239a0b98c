//! `MapBackend` over the global Leaflet object (`window.L`) and the
//! markercluster plugin. This is the only module that calls into Leaflet.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use fieldmap_shared::{ClusterOptions, IconSpec, LatLng, MapConfig, cluster_badge};
use js_sys::{Array, Function, Reflect};
use serde::Serialize;
use serde_json::json;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;

use crate::backend::{BackendError, LayerClickHandler, MapBackend, MarkerSpec};

pub(crate) fn js_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn js_err(value: JsValue) -> BackendError {
    BackendError(js_message(&value))
}

pub(crate) fn leaflet_global() -> Result<JsValue, BackendError> {
    let l = Reflect::get(&js_sys::global(), &JsValue::from_str("L")).map_err(js_err)?;
    if l.is_undefined() || l.is_null() {
        return Err("Leaflet is not loaded".into());
    }
    Ok(l)
}

fn call(target: &JsValue, method: &str, args: &[JsValue]) -> Result<JsValue, BackendError> {
    let func = Reflect::get(target, &JsValue::from_str(method)).map_err(js_err)?;
    let func: Function = func
        .dyn_into()
        .map_err(|_| BackendError(format!("{method} is not a function")))?;
    let args: Array = args.iter().collect();
    Reflect::apply(&func, target, &args).map_err(js_err)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, BackendError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| BackendError(e.to_string()))
}

fn lat_lng(p: LatLng) -> JsValue {
    let arr = Array::new();
    arr.push(&JsValue::from_f64(p.lat));
    arr.push(&JsValue::from_f64(p.lng));
    arr.into()
}

fn log_failure(op: &str, result: Result<JsValue, BackendError>) {
    if let Err(e) = result {
        tracing::warn!(op, error = %e, "leaflet call failed");
    }
}

/// Closures a layer hands to Leaflet. They must outlive the JS object.
enum LayerHooks {
    Click(#[allow(dead_code)] Closure<dyn Fn()>),
    ClusterIcon(#[allow(dead_code)] Closure<dyn Fn(JsValue) -> JsValue>),
}

#[derive(Clone)]
pub struct LeafletLayer {
    js: JsValue,
    _hooks: Option<Rc<LayerHooks>>,
}

pub struct LeafletBackend {
    l: JsValue,
    map: JsValue,
    icons: RefCell<IconHandles<JsValue>>,
}

impl LeafletBackend {
    /// Create the map inside `container` with a single tile layer.
    pub fn mount(
        container: &web_sys::HtmlElement,
        config: &MapConfig,
        center: LatLng,
        zoom: u8,
    ) -> Result<Self, BackendError> {
        let l = leaflet_global()?;
        let options = to_js(&json!({
            "center": [center.lat, center.lng],
            "zoom": zoom,
            "minZoom": config.min_zoom,
            "maxZoom": config.max_zoom,
            "zoomControl": true,
            "preferCanvas": false,
        }))?;
        let map = call(&l, "map", &[container.clone().into(), options])?;

        let tile_options = to_js(&json!({
            "attribution": config.attribution,
            "minZoom": config.min_zoom,
            "maxZoom": config.max_zoom,
        }))?;
        let tiles = call(
            &l,
            "tileLayer",
            &[JsValue::from_str(&config.tile_url), tile_options],
        )?;
        call(&tiles, "addTo", &[map.clone()])?;

        Ok(Self {
            l,
            map,
            icons: RefCell::new(IconHandles::new()),
        })
    }

    fn icon(&self, spec: &Rc<IconSpec>) -> Result<JsValue, BackendError> {
        if let Some(hit) = self.icons.borrow().get(spec) {
            return Ok(hit);
        }
        let options = to_js(&json!({
            "iconUrl": spec.url,
            "iconSize": [spec.size.0, spec.size.1],
            "iconAnchor": [spec.anchor.0, spec.anchor.1],
            "popupAnchor": [spec.popup_anchor.0, spec.popup_anchor.1],
            "className": "fm-marker-icon",
        }))?;
        let icon = call(&self.l, "icon", &[options])?;
        self.icons.borrow_mut().insert(spec, icon.clone());
        Ok(icon)
    }
}

/// `L.divIcon` options for a cluster of `count` children. An unreadable
/// count still gets a plain small badge so the plugin always has an icon.
fn badge_icon_options(count: Option<usize>) -> serde_json::Value {
    let badge = cluster_badge(count.unwrap_or(0));
    let html = if count.is_some() {
        badge.html
    } else {
        "<div><span></span></div>".to_owned()
    };
    json!({
        "html": html,
        "className": badge.class_name,
        "iconSize": [badge.size, badge.size],
    })
}

fn cluster_icon(l: &JsValue, cluster: &JsValue) -> JsValue {
    let count = call(cluster, "getChildCount", &[])
        .ok()
        .and_then(|n| n.as_f64())
        .map(|n| n as usize);
    to_js(&badge_icon_options(count))
        .and_then(|options| call(l, "divIcon", &[options]))
        .or_else(|e| {
            tracing::warn!(error = %e, "cluster badge rendering failed");
            call(l, "divIcon", &[])
        })
        .unwrap_or(JsValue::NULL)
}

/// Leaflet icon handles, live only while the matching `IconSpec` is still
/// held by the icon factory. Entries die with their spec, so this never
/// outgrows the factory's bounded cache.
struct IconHandles<V> {
    entries: HashMap<String, (Weak<IconSpec>, V)>,
}

impl<V: Clone> IconHandles<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn get(&self, spec: &Rc<IconSpec>) -> Option<V> {
        let (weak, handle) = self.entries.get(&spec.key)?;
        weak.upgrade()
            .filter(|live| Rc::ptr_eq(live, spec))
            .map(|_| handle.clone())
    }

    fn insert(&mut self, spec: &Rc<IconSpec>, handle: V) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        self.entries
            .insert(spec.key.clone(), (Rc::downgrade(spec), handle));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

impl MapBackend for LeafletBackend {
    type Layer = LeafletLayer;

    fn fly_to(&self, center: LatLng, zoom: u8) -> Result<(), BackendError> {
        call(&self.map, "flyTo", &[lat_lng(center), JsValue::from(zoom)]).map(|_| ())
    }

    fn create_marker(
        &self,
        spec: &MarkerSpec<'_>,
        on_click: Option<LayerClickHandler>,
    ) -> Result<LeafletLayer, BackendError> {
        let options = to_js(&json!({
            "title": spec.title.unwrap_or_default(),
            "riseOnHover": true,
        }))?;
        Reflect::set(&options, &JsValue::from_str("icon"), &self.icon(&spec.icon)?)
            .map_err(js_err)?;
        let marker = call(&self.l, "marker", &[lat_lng(spec.position), options])?;
        call(&marker, "bindPopup", &[JsValue::from_str(&spec.popup_html)])?;

        let hooks = match on_click {
            Some(handler) => {
                let closure = Closure::<dyn Fn()>::new(move || handler());
                call(
                    &marker,
                    "on",
                    &[JsValue::from_str("click"), closure.as_ref().clone()],
                )?;
                Some(Rc::new(LayerHooks::Click(closure)))
            }
            None => None,
        };
        Ok(LeafletLayer {
            js: marker,
            _hooks: hooks,
        })
    }

    fn create_cluster_group(&self, options: &ClusterOptions) -> Result<LeafletLayer, BackendError> {
        let js_options = to_js(options)?;
        let l = self.l.clone();
        let icon_fn = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |cluster: JsValue| {
            cluster_icon(&l, &cluster)
        });
        Reflect::set(
            &js_options,
            &JsValue::from_str("iconCreateFunction"),
            icon_fn.as_ref(),
        )
        .map_err(js_err)?;
        let group = call(&self.l, "markerClusterGroup", &[js_options])?;
        Ok(LeafletLayer {
            js: group,
            _hooks: Some(Rc::new(LayerHooks::ClusterIcon(icon_fn))),
        })
    }

    fn attach_layer(&self, layer: &LeafletLayer) {
        log_failure("addLayer", call(&self.map, "addLayer", &[layer.js.clone()]));
    }

    fn detach_layer(&self, layer: &LeafletLayer) {
        log_failure("off", call(&layer.js, "off", &[]));
        log_failure("removeLayer", call(&self.map, "removeLayer", &[layer.js.clone()]));
    }

    fn add_to_group(&self, group: &LeafletLayer, children: &[LeafletLayer]) {
        let batch: Array = children.iter().map(|c| c.js.clone()).collect();
        log_failure("addLayers", call(&group.js, "addLayers", &[batch.into()]));
    }

    fn clear_group(&self, group: &LeafletLayer) {
        log_failure("clearLayers", call(&group.js, "clearLayers", &[]));
    }

    fn focus_layer(&self, group: Option<&LeafletLayer>, layer: &LeafletLayer) {
        match group {
            Some(group) => {
                let marker = layer.js.clone();
                let open = Closure::once_into_js(move || {
                    log_failure("openPopup", call(&marker, "openPopup", &[]));
                });
                log_failure(
                    "zoomToShowLayer",
                    call(&group.js, "zoomToShowLayer", &[layer.js.clone(), open]),
                );
            }
            None => log_failure("openPopup", call(&layer.js, "openPopup", &[])),
        }
    }

    fn dispose(&self) {
        log_failure("off", call(&self.map, "off", &[]));
        log_failure("remove", call(&self.map, "remove", &[]));
        self.icons.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_shared::{IconFactory, MarkerVariant};

    #[test]
    fn unreadable_cluster_count_still_yields_a_badge() {
        let counted = badge_icon_options(Some(12));
        assert_eq!(counted["className"], "marker-cluster marker-cluster-medium");
        assert!(counted["html"].as_str().unwrap().contains(">12<"));

        let blind = badge_icon_options(None);
        assert_eq!(blind["className"], "marker-cluster marker-cluster-small");
        assert_eq!(blind["html"], "<div><span></span></div>");
        assert!(blind["iconSize"].is_array());
    }

    #[test]
    fn icon_handles_follow_factory_eviction() {
        let mut factory = IconFactory::new(2);
        let mut handles = IconHandles::new();

        let first = factory.make_icon(Some(MarkerVariant::Home), None, None);
        handles.insert(&first, "home");
        assert_eq!(handles.get(&first), Some("home"));
        drop(first);

        // Two more distinct icons push the first one out of the factory.
        for ordinal in 1..=2 {
            let spec = factory.make_icon(Some(MarkerVariant::Visit), None, Some(ordinal));
            handles.insert(&spec, "visit");
        }
        assert_eq!(handles.len(), 2);

        let rebuilt = factory.make_icon(Some(MarkerVariant::Home), None, None);
        assert_eq!(handles.get(&rebuilt), None);

        handles.clear();
        assert_eq!(handles.len(), 0);
    }
}
