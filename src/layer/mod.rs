mod changes;
mod guard;
mod inode;
mod inode_table;
pub mod path_resolver;
pub mod reclaim;
pub mod registry;
pub mod types;

pub use guard::ReclamationGuard;
pub use inode::InodeHandle;
pub use path_resolver::PathResolver;
pub use reclaim::{Reaper, Reclaimer};
pub use registry::{Layer, LayerRegistry, ROOT_PATH};
pub use types::{Change, ChangeKind, Mode, RemovePolicy, SweepReport, Timestamps};

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::Result;

/// The layered inode engine behind one process.
///
/// Bundles the layer registry, the union path resolver and the reclaimer,
/// all sharing a single [`ReclamationGuard`]. This is the surface transport
/// front ends talk to.
#[derive(Clone)]
pub struct LayerStore {
    registry: Arc<LayerRegistry>,
    resolver: PathResolver,
    reclaimer: Reclaimer,
}

impl LayerStore {
    pub fn new(policy: RemovePolicy) -> Self {
        let registry = Arc::new(LayerRegistry::new(policy));
        LayerStore {
            resolver: PathResolver::new(registry.clone()),
            reclaimer: Reclaimer::new(registry.clone()),
            registry,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.remove_policy)
    }

    pub fn registry(&self) -> &Arc<LayerRegistry> {
        &self.registry
    }

    pub fn create_layer(&self, id: &str, parent_id: Option<&str>) -> Result<()> {
        self.registry.create_layer(id, parent_id)
    }

    pub fn remove_layer(&self, id: &str) -> Result<()> {
        self.registry.remove_layer(id)
    }

    pub fn set_upper(&self, id: &str) -> Result<()> {
        self.registry.set_upper(id)
    }

    pub fn unset_upper(&self, id: &str) -> Result<()> {
        self.registry.unset_upper(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.registry.exists(id)
    }

    pub fn resolve(&self, path: &str, create: bool, mode: Mode) -> Result<InodeHandle> {
        self.resolver.resolve(path, create, mode)
    }

    pub fn release(&self, handle: InodeHandle) {
        self.resolver.release(handle)
    }

    pub fn mark_deleted(&self, handle: &InodeHandle) {
        self.resolver.mark_deleted(handle)
    }

    pub fn sweep(&self) -> SweepReport {
        self.reclaimer.sweep()
    }

    pub fn changes(&self, id: &str, ancestor_id: Option<&str>) -> Result<Vec<Change>> {
        changes::changes(&self.registry, id, ancestor_id)
    }

    pub fn diff_size(&self, id: &str, ancestor_id: Option<&str>) -> Result<u64> {
        changes::diff_size(&self.registry, id, ancestor_id)
    }

    /// Start periodic sweeps on the current tokio runtime. Returns `None`
    /// when `interval` is zero.
    pub fn spawn_reaper(&self, interval: Duration) -> Option<Reaper> {
        if interval.is_zero() {
            return None;
        }
        Some(self.reclaimer.spawn_reaper(interval))
    }
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new(RemovePolicy::default())
    }
}
