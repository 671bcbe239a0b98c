use fieldmap_shared::colors::entity_color;
use fieldmap_shared::{MapConfig, MarkerDescriptor, MarkerVariant, decode_markers};

/// Fetch map settings from the host.
pub async fn fetch_map_config() -> Result<MapConfig, String> {
    let resp = gloo_net::http::Request::get("/api/map/config")
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    resp.json::<MapConfig>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

/// Fetch the current marker feed. Malformed records are logged and dropped.
pub async fn fetch_markers() -> Result<Vec<MarkerDescriptor>, String> {
    let resp = gloo_net::http::Request::get("/api/markers")
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    let value = resp
        .json::<serde_json::Value>()
        .await
        .map_err(|e| format!("parse error: {e}"))?;
    let batch = decode_markers(value).map_err(|e| e.to_string())?;
    for skipped in &batch.skipped {
        tracing::warn!(index = skipped.index, reason = %skipped.reason, "dropping feed record");
    }
    Ok(batch.markers)
}

/// Give each tracked entity a stable hue. Only `current` and `home` markers
/// without an explicit color are touched; the entity is keyed by label,
/// falling back to the marker id.
pub fn assign_entity_colors(markers: &mut [MarkerDescriptor]) {
    for marker in markers.iter_mut() {
        let tracked = matches!(
            marker.variant,
            Some(MarkerVariant::Current | MarkerVariant::Home)
        );
        if !tracked || marker.color_override.is_some() {
            continue;
        }
        let key = match marker.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_owned(),
            _ => marker.id.to_string(),
        };
        marker.color_override = Some(entity_color(&key));
    }
}
