//! On-demand loading of the Leaflet markercluster plugin.

use std::cell::RefCell;

use fieldmap_shared::config::ClusterConfig;
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen_futures::JsFuture;

use crate::leaflet::{js_message, leaflet_global};

thread_local! {
    // One in-flight script load shared by every widget on the page.
    static PENDING_LOAD: RefCell<Option<Promise>> = const { RefCell::new(None) };
}

fn cluster_available() -> bool {
    leaflet_global()
        .ok()
        .and_then(|l| Reflect::get(&l, &JsValue::from_str("markerClusterGroup")).ok())
        .is_some_and(|f| f.is_function())
}

/// Resolve once `L.markerClusterGroup` is usable. Stylesheets and the script
/// are injected into `<head>` at most once per page.
pub async fn load_marker_cluster(config: &ClusterConfig) -> Result<(), String> {
    if cluster_available() {
        return Ok(());
    }

    let promise = match PENDING_LOAD.with(|slot| slot.borrow().clone()) {
        Some(promise) => promise,
        None => {
            let promise = inject(config)?;
            PENDING_LOAD.with(|slot| *slot.borrow_mut() = Some(promise.clone()));
            promise
        }
    };

    let outcome = JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| js_message(&e));
    let outcome = outcome.and_then(|()| {
        if cluster_available() {
            Ok(())
        } else {
            Err(format!(
                "{} loaded but markerClusterGroup is missing",
                config.script_url
            ))
        }
    });
    if outcome.is_err() {
        // Let a later mount try again.
        PENDING_LOAD.with(|slot| slot.borrow_mut().take());
    }
    outcome
}

fn inject(config: &ClusterConfig) -> Result<Promise, String> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or("no document")?;
    let head = document.head().ok_or("document has no <head>")?;

    for href in &config.style_urls {
        let selector = format!("link[href=\"{href}\"]");
        if document.query_selector(&selector).ok().flatten().is_some() {
            continue;
        }
        let link = document
            .create_element("link")
            .map_err(|e| js_message(&e))?
            .dyn_into::<web_sys::HtmlLinkElement>()
            .map_err(|_| "link element has the wrong type")?;
        link.set_rel("stylesheet");
        link.set_href(href);
        head.append_child(&link).map_err(|e| js_message(&e))?;
    }

    let script = document
        .create_element("script")
        .map_err(|e| js_message(&e))?
        .dyn_into::<web_sys::HtmlScriptElement>()
        .map_err(|_| "script element has the wrong type")?;
    script.set_src(&config.script_url);
    script.set_async(true);

    let url = config.script_url.clone();
    let promise = Promise::new(&mut |resolve: Function, reject: Function| {
        script.set_onload(Some(&resolve));
        let url = url.clone();
        let on_error = Closure::once_into_js(move |_event: JsValue| {
            let _ = reject.call1(
                &JsValue::NULL,
                &JsValue::from_str(&format!("failed to load {url}")),
            );
        });
        script.set_onerror(Some(on_error.unchecked_ref()));
    });

    head.append_child(&script).map_err(|e| js_message(&e))?;
    tracing::debug!(url = %config.script_url, "injected marker cluster script");
    Ok(promise)
}
