use parking_lot::Mutex;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use crate::error::{LayerError, Result};
use crate::layer::guard::ReclamationGuard;
use crate::layer::inode_table::ChildIndex;
use crate::layer::path_resolver::base_name;
use crate::layer::types::{Mode, Timestamps};

#[derive(Debug, Default)]
struct RefState {
    refs: u64,
    deleted: bool,
}

/// A file or directory entry owned by exactly one layer's inode table.
///
/// The parent is referenced by path key within the owning table, never by
/// pointer. Child links live in the table's [`ChildIndex`], so reclaiming an
/// inode cannot leave a dangling link or lose the links below it.
#[derive(Debug)]
pub(crate) struct Inode {
    layer_id: String,
    parent: Option<String>,
    name: String,
    path: String,
    mode: Mode,
    uid: u32,
    gid: u32,
    times: Mutex<Timestamps>,
    /// Guards exactly the reference count and the deletion flag.
    state: Mutex<RefState>,
    /// Anonymous content storage, regular files only.
    backing: Mutex<Option<File>>,
}

impl Inode {
    /// Allocate a detached inode holding one reference for its creator.
    ///
    /// Nothing is linked or inserted here, so a failed allocation leaves no
    /// trace in any table.
    pub fn allocate(
        layer_id: &str,
        parent: Option<&str>,
        path: &str,
        mode: Mode,
        uid: u32,
        gid: u32,
    ) -> Result<Self> {
        let backing = if mode.is_regular() {
            let file = tempfile::tempfile().map_err(|e| {
                LayerError::Allocation(format!(
                    "Failed to create backing storage for {}{}: {}",
                    layer_id, path, e
                ))
            })?;
            Some(file)
        } else {
            None
        };

        Ok(Inode {
            layer_id: layer_id.to_string(),
            parent: parent.map(str::to_string),
            name: base_name(path).to_string(),
            path: path.to_string(),
            mode,
            uid,
            gid,
            times: Mutex::new(Timestamps::now()),
            state: Mutex::new(RefState {
                refs: 1,
                deleted: false,
            }),
            backing: Mutex::new(backing),
        })
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn parent_key(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Take one more reference. Returns the new count.
    pub fn acquire(&self) -> u64 {
        let mut state = self.state.lock();
        state.refs += 1;
        state.refs
    }

    /// Drop one reference. Returns the new count.
    pub fn release(&self) -> u64 {
        let mut state = self.state.lock();
        if state.refs == 0 {
            tracing::warn!(
                "Release of unreferenced inode {}{}",
                self.layer_id,
                self.path
            );
        }
        state.refs = state.refs.saturating_sub(1);
        state.refs
    }

    pub fn mark_deleted(&self) {
        self.state.lock().deleted = true;
    }

    pub fn refs(&self) -> u64 {
        self.state.lock().refs
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }

    pub fn is_reclaimable(&self) -> bool {
        let state = self.state.lock();
        state.deleted && state.refs == 0
    }

    /// Drop the backing file. Only the reclamation sweep calls this.
    pub fn release_backing(&self) {
        self.backing.lock().take();
    }

    /// Bytes held in the backing file; zero for directories.
    pub fn content_len(&self) -> Result<u64> {
        if self.backing.lock().is_none() {
            return Ok(0);
        }
        self.with_backing(|file| file.metadata().map(|m| m.len()))
    }

    fn with_backing<T>(&self, op: impl FnOnce(&File) -> std::io::Result<T>) -> Result<T> {
        let backing = self.backing.lock();
        let file = backing.as_ref().ok_or_else(|| {
            LayerError::InvalidOperation(format!(
                "{}{} has no content storage",
                self.layer_id, self.path
            ))
        })?;
        op(file).map_err(LayerError::from)
    }
}

/// A counted reference to an inode.
///
/// Each handle owns exactly one reference. Dropping the handle releases it;
/// [`InodeHandle::release`] is the explicit form. Cloning takes a new one.
#[derive(Debug)]
pub struct InodeHandle {
    inode: Arc<Inode>,
    guard: Arc<ReclamationGuard>,
    /// Child index of the layer that owns the inode.
    children: Arc<ChildIndex>,
}

impl InodeHandle {
    /// Wrap an inode whose reference has already been taken by the caller.
    pub(crate) fn adopt(
        inode: Arc<Inode>,
        guard: Arc<ReclamationGuard>,
        children: Arc<ChildIndex>,
    ) -> Self {
        InodeHandle {
            inode,
            guard,
            children,
        }
    }

    pub(crate) fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn release(self) {
        drop(self);
    }

    /// Flag the inode deleted. It stays allocated until its last reference is
    /// gone and a sweep removes it.
    pub fn mark_deleted(&self) {
        let _shared = self.guard.shared_recursive();
        self.inode.mark_deleted();
    }

    pub fn layer_id(&self) -> &str {
        self.inode.layer_id()
    }

    pub fn path(&self) -> &str {
        self.inode.path()
    }

    pub fn name(&self) -> &str {
        self.inode.name()
    }

    pub fn mode(&self) -> Mode {
        self.inode.mode()
    }

    pub fn uid(&self) -> u32 {
        self.inode.uid
    }

    pub fn gid(&self) -> u32 {
        self.inode.gid
    }

    pub fn times(&self) -> Timestamps {
        *self.inode.times.lock()
    }

    pub fn ref_count(&self) -> u64 {
        self.inode.refs()
    }

    pub fn is_deleted(&self) -> bool {
        self.inode.is_deleted()
    }

    /// True when both handles point at the same inode.
    pub fn same_inode(&self, other: &InodeHandle) -> bool {
        Arc::ptr_eq(&self.inode, &other.inode)
    }

    /// Names of the entries linked directly under this one, sorted.
    pub fn children(&self) -> Vec<String> {
        self.children.names(self.inode.path())
    }

    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        self.inode.with_backing(|file| file.write_all_at(data, offset))?;
        let mut times = self.inode.times.lock();
        let now = chrono::Utc::now();
        times.mtime = now;
        times.ctime = now;
        Ok(data.len())
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let read = self.inode.with_backing(|file| {
            let mut total = 0;
            while total < len {
                let n = file.read_at(&mut buf[total..], offset + total as u64)?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(total)
        })?;
        buf.truncate(read);
        self.inode.times.lock().atime = chrono::Utc::now();
        Ok(buf)
    }

    pub fn len(&self) -> Result<u64> {
        self.inode
            .with_backing(|file| file.metadata().map(|m| m.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn set_len(&self, size: u64) -> Result<()> {
        self.inode.with_backing(|file| file.set_len(size))?;
        let mut times = self.inode.times.lock();
        let now = chrono::Utc::now();
        times.mtime = now;
        times.ctime = now;
        Ok(())
    }
}

impl Clone for InodeHandle {
    fn clone(&self) -> Self {
        let _shared = self.guard.shared_recursive();
        self.inode.acquire();
        InodeHandle {
            inode: self.inode.clone(),
            guard: self.guard.clone(),
            children: self.children.clone(),
        }
    }
}

impl Drop for InodeHandle {
    fn drop(&mut self) {
        let _shared = self.guard.shared_recursive();
        self.inode.release();
    }
}
