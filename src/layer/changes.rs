//! Change listing between a layer and one of its ancestors.
//!
//! The layers strictly between `id` (inclusive) and the ancestor (exclusive)
//! form the diff range. Their union view, most derived entry winning, is
//! compared against the ancestor's own union view:
//!
//! - a live entry also visible from the ancestor is `Modified`
//! - a live entry not visible from the ancestor is `Added`
//! - a deleted entry that the ancestor still shows is `Removed`
//!
//! Layer roots are never reported. The diff size is the content length of
//! the added and modified regular files.

use std::collections::BTreeMap;
use std::ptr;
use std::sync::Arc;

use crate::error::{LayerError, Result};
use crate::layer::inode::Inode;
use crate::layer::registry::{Layer, LayerRegistry, ROOT_PATH};
use crate::layer::types::{Change, ChangeKind};

/// List what `id` changes relative to `ancestor_id`. Without an ancestor
/// every visible entry is reported as added.
pub fn changes(
    registry: &LayerRegistry,
    id: &str,
    ancestor_id: Option<&str>,
) -> Result<Vec<Change>> {
    let _shared = registry.guard().shared();
    let result: Vec<Change> = diff(registry, id, ancestor_id)?
        .into_iter()
        .map(|(change, _)| change)
        .collect();

    tracing::debug!(
        "changes: {} against {} -> {} entries",
        id,
        ancestor_id.unwrap_or("<none>"),
        result.len()
    );
    Ok(result)
}

/// Total content bytes of the regular files `id` adds or modifies relative
/// to `ancestor_id`. Removed entries and directories count for nothing.
pub fn diff_size(registry: &LayerRegistry, id: &str, ancestor_id: Option<&str>) -> Result<u64> {
    let _shared = registry.guard().shared();

    let mut total = 0;
    for (change, inode) in diff(registry, id, ancestor_id)? {
        if change.kind == ChangeKind::Removed || !inode.mode().is_regular() {
            continue;
        }
        total += inode.content_len()?;
    }

    tracing::debug!(
        "diff_size: {} against {} -> {} bytes",
        id,
        ancestor_id.unwrap_or("<none>"),
        total
    );
    Ok(total)
}

/// Classified entries of the diff range, sorted by path, each with the
/// winning inode. The caller holds the guard shared.
fn diff(
    registry: &LayerRegistry,
    id: &str,
    ancestor_id: Option<&str>,
) -> Result<Vec<(Change, Arc<Inode>)>> {
    let layer = registry
        .get(id)
        .ok_or_else(|| LayerError::NotFound(format!("layer {}", id)))?;

    let ancestor = match ancestor_id.filter(|a| !a.is_empty()) {
        Some(ancestor_id) => {
            let wanted = registry
                .get(ancestor_id)
                .ok_or_else(|| LayerError::NotFound(format!("layer {}", ancestor_id)))?;
            let found = layer
                .chain()
                .skip(1)
                .find(|candidate| ptr::eq(*candidate, wanted.as_ref()));
            if found.is_none() {
                return Err(LayerError::NotAncestor {
                    layer: id.to_string(),
                    ancestor: ancestor_id.to_string(),
                });
            }
            Some(wanted)
        }
        None => None,
    };

    // path -> most derived entry in the diff range
    let mut range_view: BTreeMap<String, Arc<Inode>> = BTreeMap::new();
    for candidate in layer.chain() {
        if ancestor
            .as_deref()
            .is_some_and(|a| ptr::eq(candidate, a))
        {
            break;
        }
        for inode in candidate.table.snapshot() {
            range_view
                .entry(inode.path().to_string())
                .or_insert(inode);
        }
    }

    let mut result = Vec::new();
    for (path, inode) in range_view {
        if path == ROOT_PATH {
            continue;
        }
        let in_ancestor = ancestor
            .as_deref()
            .is_some_and(|a| visible_from(a, &path));

        let kind = match (inode.is_deleted(), in_ancestor) {
            (true, true) => ChangeKind::Removed,
            (true, false) => continue,
            (false, true) => ChangeKind::Modified,
            (false, false) => ChangeKind::Added,
        };
        result.push((Change { path, kind }, inode));
    }
    Ok(result)
}

/// Whether `path` resolves to a live entry through `layer`'s chain.
fn visible_from(layer: &Layer, path: &str) -> bool {
    layer
        .chain()
        .find_map(|l| l.table.get(path))
        .is_some_and(|inode| !inode.is_deleted())
}
