use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::layer::registry::{Layer, LayerRegistry};
use crate::layer::types::{RemovePolicy, SweepReport};

/// Physically frees inodes that are deleted and no longer referenced.
#[derive(Clone)]
pub struct Reclaimer {
    registry: Arc<LayerRegistry>,
}

impl Reclaimer {
    pub fn new(registry: Arc<LayerRegistry>) -> Self {
        Reclaimer { registry }
    }

    /// Run one sweep with the reclamation guard held exclusively.
    ///
    /// Every registered layer and every retired layer is scanned. A retired
    /// layer is forgotten once its table is empty and no other layer still
    /// stacks on it. Under [`RemovePolicy::Defer`] a retired layer is only
    /// condemned when nothing stacks on it and none of its inodes is held.
    pub fn sweep(&self) -> SweepReport {
        let _exclusive = self.registry.guard().exclusive();
        let mut report = SweepReport::default();

        for layer in self.registry.snapshot() {
            sweep_layer(&layer, &mut report);
        }

        let policy = self.registry.policy();
        let mut retired = self.registry.retired();

        // Forgetting a child drops its hold on the parent, which may in turn
        // become eligible; repeat until nothing changes.
        loop {
            let before = retired.len();
            let mut idx = 0;
            while idx < retired.len() {
                let layer = &retired[idx];
                let detached = Arc::strong_count(layer) == 1;

                if detached && policy == RemovePolicy::Defer && layer.all_unreferenced() {
                    for inode in layer.table.snapshot() {
                        inode.mark_deleted();
                    }
                }
                sweep_layer(layer, &mut report);

                if detached && layer.table.is_empty() {
                    tracing::debug!("Forgetting retired layer {}", layer.id());
                    retired.swap_remove(idx);
                    report.layers_forgotten += 1;
                } else {
                    idx += 1;
                }
            }
            if retired.len() == before {
                break;
            }
        }
        report.layers_retired = retired.len();

        if report.reclaimed > 0 || report.layers_forgotten > 0 {
            tracing::info!(
                "Reclaimed {} of {} inodes, forgot {} layers ({} still retired)",
                report.reclaimed,
                report.inspected,
                report.layers_forgotten,
                report.layers_retired
            );
        }
        report
    }

    /// Start a background task that sweeps every `interval`.
    pub fn spawn_reaper(&self, interval: Duration) -> Reaper {
        Reaper::spawn(self.clone(), interval)
    }
}

fn sweep_layer(layer: &Layer, report: &mut SweepReport) {
    for inode in layer.table.snapshot() {
        report.inspected += 1;
        if !inode.is_reclaimable() {
            continue;
        }

        layer.table.remove(inode.path());
        inode.release_backing();
        report.reclaimed += 1;

        tracing::trace!("Reclaimed {}{}", layer.id(), inode.path());
    }
}

/// Periodic sweeper running on the tokio runtime.
pub struct Reaper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Reaper {
    fn spawn(reclaimer: Reclaimer, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reclaimer = reclaimer.clone();
                        // The exclusive guard may block behind in-flight lookups.
                        if let Err(e) = tokio::task::spawn_blocking(move || reclaimer.sweep()).await {
                            tracing::warn!("Reclamation sweep panicked: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Reaper stopped");
        });

        tracing::debug!("Reaper started, interval={:?}", interval);
        Reaper { shutdown, handle }
    }

    /// Stop the task and wait for an in-progress sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("Reaper task failed: {}", e);
        }
    }
}
