use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fxhash::FxBuildHasher;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::layer::inode::Inode;
use crate::layer::path_resolver::base_name;

/// Parent path to the ordered set of child paths linked under it.
///
/// Owned by the layer, not by the parent inode, so a directory that is
/// reclaimed and created again still lists the children that outlived it.
#[derive(Debug, Default)]
pub(crate) struct ChildIndex {
    links: DashMap<String, BTreeSet<String>, FxBuildHasher>,
}

impl ChildIndex {
    pub fn link(&self, parent: &str, child: &str) {
        self.links
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    pub fn unlink(&self, parent: &str, child: &str) {
        let emptied = match self.links.get_mut(parent) {
            Some(mut set) => {
                set.remove(child);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.links.remove_if(parent, |_, set| set.is_empty());
        }
    }

    pub fn child_keys(&self, parent: &str) -> Vec<String> {
        self.links
            .get(parent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Basenames of the children of `parent`, sorted.
    pub fn names(&self, parent: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .child_keys(parent)
            .iter()
            .map(|key| base_name(key).to_string())
            .collect();
        names.sort();
        names
    }
}

/// Per-layer mapping from intra-layer path to inode.
///
/// The table is the long-lived owner of every inode in it; handles only
/// borrow a counted reference. Entries leave the table solely through the
/// reclamation sweep.
#[derive(Debug)]
pub(crate) struct InodeTable {
    inodes: DashMap<String, Arc<Inode>, FxBuildHasher>,
    children: Arc<ChildIndex>,
}

impl InodeTable {
    pub fn new() -> Self {
        InodeTable {
            inodes: DashMap::with_hasher(FxBuildHasher::default()),
            children: Arc::new(ChildIndex::default()),
        }
    }

    pub fn children(&self) -> &Arc<ChildIndex> {
        &self.children
    }

    pub fn get(&self, path: &str) -> Option<Arc<Inode>> {
        self.inodes.get(path).map(|entry| entry.value().clone())
    }

    /// Insert a freshly allocated inode, or take a reference on the entry a
    /// concurrent creator installed first.
    ///
    /// The new entry is linked under its parent while the key's shard is
    /// still locked, so no other caller can see it unlinked. A losing
    /// allocation is never linked.
    pub fn insert_or_acquire(&self, inode: Inode) -> Arc<Inode> {
        match self.inodes.entry(inode.path().to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get().clone();
                existing.acquire();
                tracing::debug!(
                    "Lost create race for {}{}, sharing existing inode",
                    inode.layer_id(),
                    inode.path()
                );
                existing
            }
            Entry::Vacant(slot) => {
                if let Some(parent) = inode.parent_key() {
                    self.children.link(parent, inode.path());
                }
                slot.insert(Arc::new(inode)).value().clone()
            }
        }
    }

    /// Drop an entry and its link under the parent. Links to its own
    /// children are kept.
    pub fn remove(&self, path: &str) -> Option<Arc<Inode>> {
        let (_, inode) = self.inodes.remove(path)?;
        if let Some(parent) = inode.parent_key() {
            self.children.unlink(parent, path);
        }
        Some(inode)
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<Arc<Inode>> {
        self.inodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inodes.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
