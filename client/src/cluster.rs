use fieldmap_shared::ClusterOptions;

use crate::backend::MapBackend;

/// Lifecycle of the optional clustering layer for one mounted map.
/// `Loaded` and `FailedToLoad` are terminal until the next mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Uninitialized,
    Loading,
    Loaded,
    FailedToLoad,
}

/// Proof that a load was started for a specific mount. Results presented
/// with a ticket from another mount are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    mount_id: u64,
}

impl LoadTicket {
    pub fn mount_id(self) -> u64 {
        self.mount_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadResolution {
    Applied(ClusterPhase),
    Discarded,
}

pub struct ClusterManager<L> {
    mount_id: u64,
    phase: ClusterPhase,
    layer: Option<L>,
    options: ClusterOptions,
    torn_down: bool,
}

impl<L: Clone> ClusterManager<L> {
    pub fn new(mount_id: u64, options: ClusterOptions) -> Self {
        Self {
            mount_id,
            phase: ClusterPhase::Uninitialized,
            layer: None,
            options,
            torn_down: false,
        }
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    pub fn layer(&self) -> Option<&L> {
        self.layer.as_ref()
    }

    pub fn extension_loaded(&self) -> bool {
        self.phase == ClusterPhase::Loaded
    }

    pub fn using_fallback(&self) -> bool {
        self.phase == ClusterPhase::FailedToLoad
    }

    /// Start the one load attempt this mount gets.
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if self.torn_down || self.phase != ClusterPhase::Uninitialized {
            return None;
        }
        self.phase = ClusterPhase::Loading;
        Some(LoadTicket {
            mount_id: self.mount_id,
        })
    }

    /// Apply the outcome of the extension load. On success the cluster layer
    /// is built and attached exactly once.
    pub fn resolve<B>(
        &mut self,
        backend: &B,
        ticket: LoadTicket,
        outcome: Result<(), String>,
    ) -> LoadResolution
    where
        B: MapBackend<Layer = L>,
    {
        if self.torn_down || ticket.mount_id != self.mount_id || self.phase != ClusterPhase::Loading
        {
            tracing::debug!(
                mount = ticket.mount_id,
                current = self.mount_id,
                "discarding stale cluster extension result"
            );
            return LoadResolution::Discarded;
        }

        self.phase = match outcome {
            Ok(()) => match backend.create_cluster_group(&self.options) {
                Ok(layer) => {
                    backend.attach_layer(&layer);
                    self.layer = Some(layer);
                    ClusterPhase::Loaded
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not build cluster layer, rendering markers individually");
                    ClusterPhase::FailedToLoad
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "marker clustering unavailable, rendering markers individually");
                ClusterPhase::FailedToLoad
            }
        };
        LoadResolution::Applied(self.phase)
    }

    pub fn teardown<B>(&mut self, backend: &B)
    where
        B: MapBackend<Layer = L>,
    {
        if let Some(layer) = self.layer.take() {
            backend.clear_group(&layer);
            backend.detach_layer(&layer);
        }
        self.torn_down = true;
    }
}
