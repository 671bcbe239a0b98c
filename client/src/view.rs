use fieldmap_shared::LatLng;

use crate::backend::MapBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUpdate {
    Unchanged,
    Animated,
    /// The backend refused the transition; the widget carries on.
    Failed,
    Ignored,
}

/// Turns incoming center/zoom props into fly-to commands. Only a change
/// animates; re-sending the current view is a no-op.
#[derive(Debug, Default)]
pub struct ViewController {
    current: Option<(LatLng, u8)>,
}

impl ViewController {
    pub fn new(initial: Option<(LatLng, u8)>) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> Option<(LatLng, u8)> {
        self.current
    }

    pub fn apply<B: MapBackend>(&mut self, backend: &B, center: LatLng, zoom: u8) -> ViewUpdate {
        if !center.is_valid() {
            tracing::warn!(lat = center.lat, lng = center.lng, "ignoring invalid map center");
            return ViewUpdate::Ignored;
        }
        if self.current == Some((center, zoom)) {
            return ViewUpdate::Unchanged;
        }
        // A failed transition still counts as the current view.
        self.current = Some((center, zoom));
        match backend.fly_to(center, zoom) {
            Ok(()) => ViewUpdate::Animated,
            Err(e) => {
                tracing::debug!(error = %e, "view transition failed");
                ViewUpdate::Failed
            }
        }
    }
}
