use std::sync::Arc;

use crate::error::{LayerError, Result};
use crate::layer::inode::{Inode, InodeHandle};
use crate::layer::registry::{effective_ids, Layer, LayerRegistry, ROOT_PATH};
use crate::layer::types::Mode;

/// Resolves `/<layer-id>/<path>` names to inodes by walking the layer chain.
///
/// The most derived layer holding a path wins; ancestors are only consulted
/// when every layer below them misses. New entries are created in the most
/// derived layer that already holds their parent directory.
#[derive(Clone)]
pub struct PathResolver {
    registry: Arc<LayerRegistry>,
}

impl PathResolver {
    pub fn new(registry: Arc<LayerRegistry>) -> Self {
        PathResolver { registry }
    }

    /// Find `path` and take a reference on it, creating it with `mode` when
    /// `create` is set and no layer in the chain holds it yet.
    ///
    /// An entry that is marked deleted but not yet swept still resolves, even
    /// with `create` set. Its content goes away with the next sweep once the
    /// last reference is dropped.
    pub fn resolve(&self, path: &str, create: bool, mode: Mode) -> Result<InodeHandle> {
        let guard = self.registry.guard();
        let _shared = guard.shared();

        let (layer_id, intra_path) = split_path(path)?;
        let layer = self
            .registry
            .get(layer_id)
            .ok_or_else(|| LayerError::NotFound(format!("layer {}", layer_id)))?;
        let dir = parent_dir(&intra_path);

        let mut insertion: Option<(&Layer, Arc<Inode>)> = None;
        for candidate in layer.chain() {
            if let Some(inode) = candidate.table.get(&intra_path) {
                let refs = inode.acquire();
                tracing::trace!(
                    "resolve: {} found in layer {} (ref={})",
                    path,
                    candidate.id(),
                    refs
                );
                if create && inode.is_deleted() {
                    tracing::debug!(
                        "resolve: create of {} returned deleted inode in layer {}",
                        path,
                        candidate.id()
                    );
                }
                return Ok(InodeHandle::adopt(
                    inode,
                    guard.clone(),
                    candidate.table.children().clone(),
                ));
            }

            if insertion.is_none() {
                if let Some(parent) = candidate.table.get(dir) {
                    insertion = Some((candidate, parent));
                }
            }
        }

        if !create {
            tracing::trace!("resolve: {} not found in any layer", path);
            return Err(LayerError::NotFound(path.to_string()));
        }

        let Some((target, parent)) = insertion else {
            tracing::warn!(
                "Create requested on {}, but no layer in the chain of {} holds {}",
                intra_path,
                layer_id,
                dir
            );
            return Err(LayerError::NotFound(format!(
                "{} (no parent directory {})",
                path, dir
            )));
        };

        let (uid, gid) = effective_ids();
        let inode = Inode::allocate(target.id(), Some(parent.path()), &intra_path, mode, uid, gid)?;
        let inode = target.table.insert_or_acquire(inode);

        tracing::debug!(
            "Created {} in layer {} (mode {})",
            intra_path,
            target.id(),
            mode
        );
        Ok(InodeHandle::adopt(
            inode,
            guard.clone(),
            target.table.children().clone(),
        ))
    }

    pub fn release(&self, handle: InodeHandle) {
        handle.release();
    }

    pub fn mark_deleted(&self, handle: &InodeHandle) {
        let inode = handle.inode();
        if inode.path() == ROOT_PATH && self.is_registered_root(inode) {
            tracing::warn!(
                "Refusing to delete the root of registered layer {}",
                inode.layer_id()
            );
            return;
        }
        handle.mark_deleted();
    }

    fn is_registered_root(&self, inode: &Arc<Inode>) -> bool {
        self.registry
            .get(inode.layer_id())
            .and_then(|layer| layer.table.get(ROOT_PATH))
            .is_some_and(|root| Arc::ptr_eq(&root, inode))
    }
}

/// Split `/<layer-id>/<rest>` into the layer id and a normalized intra-layer
/// path. An empty rest denotes the layer root.
pub fn split_path(path: &str) -> Result<(&str, String)> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| LayerError::InvalidPath(format!("'{}' is not absolute", path)))?;

    let (layer_id, intra) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ROOT_PATH),
    };

    if layer_id.is_empty() {
        return Err(LayerError::InvalidPath(format!(
            "'{}' does not name a layer",
            path
        )));
    }

    Ok((layer_id, normalize(intra)))
}

/// Collapse repeated separators and drop a trailing one.
fn normalize(intra: &str) -> String {
    let mut normalized = String::with_capacity(intra.len());
    for component in intra.split('/').filter(|c| !c.is_empty()) {
        normalized.push('/');
        normalized.push_str(component);
    }
    if normalized.is_empty() {
        normalized.push_str(ROOT_PATH);
    }
    normalized
}

/// `dirname` of a normalized intra-layer path.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT_PATH,
        Some(idx) => &path[..idx],
    }
}

/// `basename` of a normalized intra-layer path; the root is its own name.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) if idx + 1 < path.len() => &path[idx + 1..],
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::types::RemovePolicy;

    fn resolver_with(layers: &[(&str, Option<&str>)]) -> PathResolver {
        let registry = Arc::new(LayerRegistry::new(RemovePolicy::Defer));
        for (id, parent) in layers {
            registry.create_layer(id, *parent).unwrap();
        }
        PathResolver::new(registry)
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/base/foo.txt").unwrap(),
            ("base", "/foo.txt".to_string())
        );
        assert_eq!(split_path("/base").unwrap(), ("base", "/".to_string()));
        assert_eq!(split_path("/base/").unwrap(), ("base", "/".to_string()));
        assert_eq!(
            split_path("/base//a///b/").unwrap(),
            ("base", "/a/b".to_string())
        );
    }

    #[test]
    fn test_split_path_rejects_malformed() {
        assert!(matches!(
            split_path("base/foo"),
            Err(LayerError::InvalidPath(_))
        ));
        assert!(matches!(split_path("/"), Err(LayerError::InvalidPath(_))));
        assert!(matches!(
            split_path("//foo"),
            Err(LayerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_parent_dir_and_base_name() {
        assert_eq!(parent_dir("/"), "/");
        assert_eq!(parent_dir("/foo.txt"), "/");
        assert_eq!(parent_dir("/a/b/c"), "/a/b");
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name("/foo.txt"), "foo.txt");
        assert_eq!(base_name("/a/b/c"), "c");
    }

    #[test]
    fn test_resolve_root() {
        let resolver = resolver_with(&[("base", None)]);
        let root = resolver.resolve("/base", false, Mode::directory(0o755)).unwrap();
        assert_eq!(root.path(), "/");
        assert_eq!(root.ref_count(), 1);
    }

    #[test]
    fn test_create_links_child_under_parent() {
        let resolver = resolver_with(&[("base", None)]);
        let file = resolver
            .resolve("/base/foo.txt", true, Mode::regular(0o644))
            .unwrap();
        assert_eq!(file.ref_count(), 1);
        assert_eq!(file.name(), "foo.txt");

        let root = resolver.resolve("/base/", false, Mode::directory(0)).unwrap();
        assert_eq!(root.children(), vec!["foo.txt"]);
    }

    #[test]
    fn test_mark_deleted_refuses_registered_root() {
        let resolver = resolver_with(&[("base", None)]);
        let root = resolver.resolve("/base", false, Mode::directory(0)).unwrap();
        resolver.mark_deleted(&root);
        assert!(!root.is_deleted());
    }

    #[test]
    fn test_mark_deleted_keeps_entry_resolvable_until_swept() {
        let resolver = resolver_with(&[("base", None)]);
        let file = resolver
            .resolve("/base/foo.txt", true, Mode::regular(0o644))
            .unwrap();
        resolver.mark_deleted(&file);
        assert!(file.is_deleted());

        let again = resolver
            .resolve("/base/foo.txt", false, Mode::regular(0))
            .unwrap();
        assert!(again.same_inode(&file));
    }
}
