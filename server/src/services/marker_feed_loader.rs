use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldmap_shared::{FeedError, decode_markers_str};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Feed(FeedError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "cannot read marker file: {e}"),
            LoadError::Feed(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoadError {}

pub async fn run(state: AppState, path: PathBuf, every: Duration) {
    let mut interval = tokio::time::interval(every);

    // Load immediately on startup, then on every tick.
    loop {
        interval.tick().await;

        if let Err(e) = reload(&state, &path).await {
            warn!(path = %path.display(), "keeping previous marker feed: {e}");
        }
    }
}

/// Re-read the feed file. Returns true when a new revision was published;
/// an identical file leaves the revision (and so the ETag) unchanged.
pub async fn reload(state: &AppState, path: &Path) -> Result<bool, LoadError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(LoadError::Io)?;
    let batch = decode_markers_str(&raw).map_err(LoadError::Feed)?;

    for skipped in &batch.skipped {
        warn!(index = skipped.index, reason = %skipped.reason, "skipping marker record");
    }

    let mut feed = state.feed.write().await;
    if feed.loaded_at.is_some()
        && *feed.markers == batch.markers
        && feed.skipped == batch.skipped.len()
    {
        return Ok(false);
    }

    let next = feed.next(batch.markers, batch.skipped.len());
    info!(
        revision = next.revision,
        markers = next.markers.len(),
        skipped = next.skipped,
        "loaded marker feed"
    );
    *feed = next;
    Ok(true)
}
