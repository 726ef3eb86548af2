use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fxhash::FxBuildHasher;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LayerError, Result};
use crate::layer::guard::ReclamationGuard;
use crate::layer::inode::Inode;
use crate::layer::inode_table::InodeTable;
use crate::layer::types::{Mode, RemovePolicy};

/// Key of every layer's root inode.
pub const ROOT_PATH: &str = "/";

const ROOT_PERMISSIONS: u32 = 0o755;

/// A named view stacked on at most one parent.
#[derive(Debug)]
pub struct Layer {
    id: String,
    parent: Option<Arc<Layer>>,
    pub(crate) table: InodeTable,
    upper: AtomicBool,
}

impl Layer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    pub fn is_upper(&self) -> bool {
        self.upper.load(Ordering::Acquire)
    }

    /// This layer followed by its ancestors, most derived first.
    pub fn chain(&self) -> LayerChain<'_> {
        LayerChain { next: Some(self) }
    }

    /// Number of entries in this layer's own table.
    pub fn inode_count(&self) -> usize {
        self.table.len()
    }

    /// Sorted paths of the entries created directly in this layer.
    pub fn paths(&self) -> Vec<String> {
        self.table.keys()
    }

    /// Outstanding references on the entry stored under `path` in this
    /// layer's own table.
    pub fn ref_count(&self, path: &str) -> Option<u64> {
        self.table.get(path).map(|inode| inode.refs())
    }

    fn mark_all_deleted(&self) {
        for inode in self.table.snapshot() {
            inode.mark_deleted();
        }
    }

    pub(crate) fn all_unreferenced(&self) -> bool {
        self.table.snapshot().iter().all(|inode| inode.refs() == 0)
    }
}

pub struct LayerChain<'a> {
    next: Option<&'a Layer>,
}

impl<'a> Iterator for LayerChain<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<&'a Layer> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// Mapping from layer id to layer.
///
/// Construct one per process before the first layer operation and share it
/// behind an `Arc`; there is no implicit global instance.
pub struct LayerRegistry {
    layers: DashMap<String, Arc<Layer>, FxBuildHasher>,
    /// Unregistered layers whose teardown is still pending.
    retired: Mutex<Vec<Arc<Layer>>>,
    guard: Arc<ReclamationGuard>,
    policy: RemovePolicy,
}

impl LayerRegistry {
    pub fn new(policy: RemovePolicy) -> Self {
        LayerRegistry {
            layers: DashMap::with_hasher(FxBuildHasher::default()),
            retired: Mutex::new(Vec::new()),
            guard: Arc::new(ReclamationGuard::new()),
            policy,
        }
    }

    pub fn policy(&self) -> RemovePolicy {
        self.policy
    }

    pub fn guard(&self) -> &Arc<ReclamationGuard> {
        &self.guard
    }

    /// Register a new layer on top of `parent_id`. `None` or an empty id
    /// creates a base layer.
    pub fn create_layer(&self, id: &str, parent_id: Option<&str>) -> Result<()> {
        validate_layer_id(id)?;
        let _shared = self.guard.shared();

        if self.layers.contains_key(id) {
            return Err(LayerError::AlreadyExists(format!("layer {}", id)));
        }

        let parent = match parent_id.filter(|p| !p.is_empty()) {
            Some(parent_id) => {
                let parent = self.get(parent_id);
                if parent.is_none() {
                    tracing::warn!("Cannot find parent layer {} for {}", parent_id, id);
                }
                Some(parent.ok_or_else(|| LayerError::ParentNotFound(parent_id.to_string()))?)
            }
            None => None,
        };

        let layer = Layer {
            id: id.to_string(),
            parent,
            table: InodeTable::new(),
            upper: AtomicBool::new(false),
        };

        let (uid, gid) = effective_ids();
        let root = Inode::allocate(
            id,
            None,
            ROOT_PATH,
            Mode::directory(ROOT_PERMISSIONS),
            uid,
            gid,
        )?;
        // The table owns the root; nobody holds it open until a lookup does.
        let root = layer.table.insert_or_acquire(root);
        root.release();

        match self.layers.entry(id.to_string()) {
            Entry::Occupied(_) => Err(LayerError::AlreadyExists(format!("layer {}", id))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(layer));
                tracing::debug!(
                    "Created layer {} (parent: {})",
                    id,
                    parent_id.filter(|p| !p.is_empty()).unwrap_or("<none>")
                );
                Ok(())
            }
        }
    }

    /// Unregister a layer and apply the configured [`RemovePolicy`] to it.
    ///
    /// Layers stacked on top of it keep resolving through it until they are
    /// removed themselves.
    pub fn remove_layer(&self, id: &str) -> Result<()> {
        let _shared = self.guard.shared();

        let (_, layer) = self
            .layers
            .remove(id)
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", id)))?;

        if self.policy == RemovePolicy::Cascade {
            layer.mark_all_deleted();
        }

        tracing::debug!(
            "Removed layer {} ({} inodes, policy: {})",
            id,
            layer.inode_count(),
            self.policy
        );
        self.retired.lock().push(layer);
        Ok(())
    }

    pub fn set_upper(&self, id: &str) -> Result<()> {
        self.set_upper_flag(id, true)
    }

    pub fn unset_upper(&self, id: &str) -> Result<()> {
        self.set_upper_flag(id, false)
    }

    fn set_upper_flag(&self, id: &str, upper: bool) -> Result<()> {
        let layer = self
            .layers
            .get(id)
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", id)))?;
        layer.upper.store(upper, Ordering::Release);
        Ok(())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Layer>> {
        self.layers.get(id).map(|entry| entry.value().clone())
    }

    pub fn parent_of(&self, id: &str) -> Result<Option<String>> {
        let layer = self
            .get(id)
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", id)))?;
        Ok(layer.parent().map(|p| p.id().to_string()))
    }

    /// Sorted ids of every registered layer.
    pub fn layer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.layers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of removed layers still awaiting teardown.
    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Layer>> {
        self.layers.iter().map(|e| e.value().clone()).collect()
    }

    pub(crate) fn retired(&self) -> MutexGuard<'_, Vec<Arc<Layer>>> {
        self.retired.lock()
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new(RemovePolicy::default())
    }
}

fn validate_layer_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LayerError::InvalidPath(
            "layer id cannot be empty".to_string(),
        ));
    }
    if id.contains('/') {
        return Err(LayerError::InvalidPath(format!(
            "layer id '{}' cannot contain '/'",
            id
        )));
    }
    Ok(())
}

pub(crate) fn effective_ids() -> (u32, u32) {
    (
        nix::unistd::geteuid().as_raw(),
        nix::unistd::getegid().as_raw(),
    )
}
