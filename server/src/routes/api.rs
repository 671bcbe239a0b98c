use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use fieldmap_shared::MapConfig;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let feed = state.feed.read().await;
    Json(serde_json::json!({
        "status": "ok",
        "markers": feed.markers.len(),
        "skipped": feed.skipped,
        "feed_loaded_at": feed.loaded_at.map(|at| at.to_rfc3339()),
    }))
}

pub async fn get_map_config(State(state): State<AppState>) -> Json<MapConfig> {
    Json((*state.map_config).clone())
}

/// Serve the pre-serialized marker feed, revalidated through its revision ETag.
pub async fn get_markers(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (etag, json): (String, Arc<Bytes>) = {
        let feed = state.feed.read().await;
        (markers_etag(feed.revision), Arc::clone(&feed.markers_json))
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response("no-cache", Some(etag.as_str()));
    }

    json_bytes_response((*json).clone(), "no-cache", Some(etag.as_str()))
}

fn markers_etag(revision: u64) -> String {
    format!("\"markers-{revision}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use fieldmap_shared::{LatLng, MapConfig, MarkerDescriptor, MarkerVariant};

    use super::{HeaderMap, HeaderValue, StatusCode, header, if_none_match_matches, markers_etag};
    use crate::state::AppState;

    async fn spawn_test_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state, std::env::temp_dir());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    async fn seeded_state() -> AppState {
        let state = AppState::new(MapConfig::default());
        {
            let mut feed = state.feed.write().await;
            let next = feed.next(
                vec![
                    MarkerDescriptor::new(1, LatLng::new(19.0, 72.8))
                        .with_variant(MarkerVariant::Current),
                    MarkerDescriptor::new("store-2", LatLng::new(19.1, 72.9))
                        .with_variant(MarkerVariant::Store),
                ],
                1,
            );
            *feed = next;
        }
        state
    }

    #[test]
    fn if_none_match_accepts_weak_and_listed_tags() {
        let etag = markers_etag(4);
        let mut headers = HeaderMap::new();
        assert!(!if_none_match_matches(&headers, &etag));

        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("\"markers-3\", W/\"markers-4\""),
        );
        assert!(if_none_match_matches(&headers, &etag));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"markers-3\""));
        assert!(!if_none_match_matches(&headers, &etag));
    }

    #[tokio::test]
    async fn health_reports_feed_counts() {
        let (addr, server_handle) = spawn_test_server(seeded_state().await).await;

        let health = reqwest::Client::new()
            .get(format!("http://{addr}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(health.get("markers").and_then(|v| v.as_u64()), Some(2));
        assert_eq!(health.get("skipped").and_then(|v| v.as_u64()), Some(1));
        assert!(health.get("feed_loaded_at").is_some_and(|v| v.is_string()));

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn markers_endpoint_serves_feed_with_etag() {
        let (addr, server_handle) = spawn_test_server(seeded_state().await).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/api/markers");

        let response = client.get(&url).send().await.expect("markers request");
        assert_eq!(response.status(), StatusCode::OK);
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .expect("etag header");
        assert_eq!(etag, markers_etag(1));
        let markers = response
            .json::<Vec<MarkerDescriptor>>()
            .await
            .expect("parse markers");
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].variant, Some(MarkerVariant::Store));

        let revalidated = client
            .get(&url)
            .header(header::IF_NONE_MATCH, etag)
            .send()
            .await
            .expect("conditional request");
        assert_eq!(revalidated.status(), StatusCode::NOT_MODIFIED);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn map_config_round_trips() {
        let mut config = MapConfig::default();
        config.max_zoom = 17;
        let (addr, server_handle) = spawn_test_server(AppState::new(config.clone())).await;

        let served = reqwest::Client::new()
            .get(format!("http://{addr}/api/map/config"))
            .send()
            .await
            .expect("config request")
            .json::<MapConfig>()
            .await
            .expect("parse config");
        assert_eq!(served, config);

        server_handle.abort();
        let _ = server_handle.await;
    }
}
