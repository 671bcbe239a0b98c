use chrono::{DateTime, Local, Utc};
use gloo_timers::future::TimeoutFuture;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use fieldmap_shared::popup::badge_label;
use fieldmap_shared::time_format::format_marker_time;
use fieldmap_shared::{LatLng, MapConfig, MarkerDescriptor, MarkerId};

use crate::feed::{assign_entity_colors, fetch_map_config, fetch_markers};
use crate::widget::MapWidget;

const FOCUS_ZOOM: u8 = 15;
const MIN_REFRESH_SECS: u32 = 5;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FeedStatus {
    Connecting,
    Live,
    Stale(String),
}

/// Poll interval in milliseconds, floored at `MIN_REFRESH_SECS`.
fn refresh_delay_ms(secs: u32) -> u32 {
    secs.max(MIN_REFRESH_SECS).saturating_mul(1000)
}

fn set_loading_shell_step(step: &str) {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    if let Some(step_el) = document.get_element_by_id("app-loading-step") {
        step_el.set_text_content(Some(step));
    }
}

fn remove_loading_shell() {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    if let Some(shell) = document.get_element_by_id("app-loading-shell") {
        shell.remove();
    }
}

/// Fetch the feed once and publish it. Returns false once the page is gone.
async fn refresh_markers(
    markers: RwSignal<Vec<MarkerDescriptor>>,
    status: RwSignal<FeedStatus>,
    updated_at: RwSignal<Option<DateTime<Utc>>>,
) -> bool {
    let result = fetch_markers().await;
    let next_status = match result {
        Ok(mut list) => {
            assign_entity_colors(&mut list);
            if markers.try_set(list).is_some() {
                return false;
            }
            updated_at.set(Some(Utc::now()));
            FeedStatus::Live
        }
        Err(e) => {
            tracing::warn!(error = %e, "marker feed refresh failed");
            FeedStatus::Stale(e)
        }
    };
    status.try_set(next_status).is_none()
}

#[component]
pub fn App() -> impl IntoView {
    let config: RwSignal<Option<MapConfig>> = RwSignal::new(None);
    let markers: RwSignal<Vec<MarkerDescriptor>> = RwSignal::new(Vec::new());
    let status: RwSignal<FeedStatus> = RwSignal::new(FeedStatus::Connecting);
    let updated_at: RwSignal<Option<DateTime<Utc>>> = RwSignal::new(None);
    let center: RwSignal<LatLng> = RwSignal::new(MapConfig::default().initial_center);
    let zoom: RwSignal<u8> = RwSignal::new(MapConfig::default().initial_zoom);
    let highlighted: RwSignal<Option<MarkerId>> = RwSignal::new(None);
    let clicked: RwSignal<Option<MarkerDescriptor>> = RwSignal::new(None);

    // Boot: config first, then the first feed, then the refresh loop.
    spawn_local(async move {
        set_loading_shell_step("Loading map settings");
        let cfg = match fetch_map_config().await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "map config unavailable, using defaults");
                MapConfig::default()
            }
        };
        let refresh_ms = refresh_delay_ms(cfg.feed_refresh_secs);
        center.set(cfg.initial_center);
        zoom.set(cfg.initial_zoom);
        config.set(Some(cfg));

        set_loading_shell_step("Loading markers");
        if !refresh_markers(markers, status, updated_at).await {
            return;
        }
        remove_loading_shell();

        loop {
            TimeoutFuture::new(refresh_ms).await;
            if !refresh_markers(markers, status, updated_at).await {
                tracing::debug!("dashboard gone, stopping feed refresh");
                break;
            }
        }
    });

    let on_marker_click = Callback::new(move |marker: MarkerDescriptor| {
        clicked.set(Some(marker));
    });

    let focus = move |marker: &MarkerDescriptor| {
        center.set(marker.position);
        zoom.update(|z| *z = (*z).max(FOCUS_ZOOM));
        highlighted.set(Some(marker.id.clone()));
    };

    let status_text = move || match status.get() {
        FeedStatus::Connecting => "Connecting".to_owned(),
        FeedStatus::Live => match updated_at.get() {
            Some(at) => format!(
                "Live, updated {}",
                format_marker_time(&at, &Local::now())
            ),
            None => "Live".to_owned(),
        },
        FeedStatus::Stale(e) => format!("Offline ({e})"),
    };

    view! {
        <div class="fm-dashboard">
            <aside class="fm-sidebar">
                <header class="fm-sidebar-header">
                    <h1>"Field map"</h1>
                    <span
                        class="fm-status"
                        class:fm-status-live=move || status.get() == FeedStatus::Live
                    >
                        {status_text}
                    </span>
                </header>
                <div class="fm-count">
                    {move || format!("{} markers", markers.with(Vec::len))}
                </div>
                <ul class="fm-marker-list">
                    <For
                        each=move || markers.get()
                        key=|m| (m.id.to_string(), m.label.clone(), m.timestamp)
                        children=move |marker: MarkerDescriptor| {
                            let id = marker.id.clone();
                            let is_active = move || highlighted.get().as_ref() == Some(&id);
                            let title = marker
                                .label
                                .clone()
                                .unwrap_or_else(|| format!("Marker {}", marker.id));
                            let badge = marker.variant.map(badge_label).unwrap_or("Marker");
                            let when = marker
                                .timestamp
                                .map(|ts| format_marker_time(&ts, &Local::now()))
                                .unwrap_or_default();
                            view! {
                                <li
                                    class="fm-marker-row"
                                    class:fm-marker-row-active=is_active
                                    on:click=move |_| focus(&marker)
                                >
                                    <span class="fm-marker-title">{title}</span>
                                    <span class="fm-marker-badge">{badge}</span>
                                    <span class="fm-marker-time">{when}</span>
                                </li>
                            }
                        }
                    />
                </ul>
                <section class="fm-clicked">
                    {move || match clicked.get() {
                        Some(m) => view! {
                            <div class="fm-clicked-card">
                                <div class="fm-clicked-title">
                                    {m.label.clone().unwrap_or_else(|| "Location".to_owned())}
                                </div>
                                <div class="fm-clicked-coords">
                                    {format!("{:.5}, {:.5}", m.position.lat, m.position.lng)}
                                </div>
                                <div class="fm-clicked-note">
                                    {m.description.clone().or(m.subtitle.clone()).unwrap_or_default()}
                                </div>
                            </div>
                        }
                        .into_any(),
                        None => view! {
                            <div class="fm-clicked-empty">"Click a marker for details"</div>
                        }
                        .into_any(),
                    }}
                </section>
            </aside>
            <main class="fm-main">
                {move || {
                    config
                        .get()
                        .map(|cfg| {
                            view! {
                                <MapWidget
                                    config=cfg
                                    center=center
                                    zoom=zoom
                                    markers=markers
                                    highlighted_id=highlighted
                                    on_marker_click=on_marker_click
                                />
                            }
                        })
                }}
            </main>
        </div>
    }
}
