use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared/exclusive barrier between inode users and the reclamation sweep.
///
/// Lookups, reference changes and deletion marks hold it shared; only the
/// sweep, which physically removes inodes from their tables, holds it
/// exclusive. A sweep therefore never observes a lookup halfway through
/// handing out a reference, and no lookup sees a half-reclaimed inode.
#[derive(Debug, Default)]
pub struct ReclamationGuard {
    lock: RwLock<()>,
}

impl ReclamationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Shared access that does not queue behind a waiting sweep. Used on
    /// release paths, which may run while the same thread is already inside
    /// a shared section.
    pub(crate) fn shared_recursive(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read_recursive()
    }

    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    /// True while a sweep holds the guard.
    pub fn is_sweeping(&self) -> bool {
        self.lock.is_locked_exclusive()
    }
}
