mod common;

use common::{create_dir, create_file, stacked_store};
use unionlayer::{Change, ChangeKind, LayerError, LayerStore, RemovePolicy};

fn change(path: &str, kind: ChangeKind) -> Change {
    Change {
        path: path.to_string(),
        kind,
    }
}

/// base: /conf /etc /etc/hosts /gone; top: /conf /gone(deleted) /new /scratch(deleted)
fn populated() -> LayerStore {
    let store = stacked_store(RemovePolicy::Defer);

    // Derived entries first so they are not resolved from base
    create_file(&store, "/top/conf").release();
    let top_gone = create_file(&store, "/top/gone");
    store.mark_deleted(&top_gone);
    drop(top_gone);
    let scratch = create_file(&store, "/top/scratch");
    store.mark_deleted(&scratch);
    drop(scratch);

    create_file(&store, "/base/conf").release();
    create_file(&store, "/base/gone").release();
    create_dir(&store, "/base/etc").release();
    create_file(&store, "/base/etc/hosts").release();

    create_file(&store, "/top/new").release();
    store
}

#[test]
fn test_changes_against_parent() {
    let store = populated();
    let listing = store.changes("top", Some("base")).unwrap();

    assert_eq!(
        listing,
        vec![
            change("/conf", ChangeKind::Modified),
            change("/gone", ChangeKind::Removed),
            change("/new", ChangeKind::Added),
        ]
    );
}

#[test]
fn test_changes_without_ancestor_lists_live_union() {
    let store = populated();
    let listing = store.changes("top", None).unwrap();
    let paths: Vec<&str> = listing.iter().map(|c| c.path.as_str()).collect();

    assert_eq!(paths, vec!["/conf", "/etc", "/etc/hosts", "/new"]);
    assert!(listing.iter().all(|c| c.kind == ChangeKind::Added));

    // An empty ancestor id behaves like no ancestor
    assert_eq!(store.changes("top", Some("")).unwrap(), listing);
}

#[test]
fn test_changes_span_intermediate_layers() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    store.create_layer("mid", Some("base")).unwrap();
    store.create_layer("top", Some("mid")).unwrap();

    create_file(&store, "/mid/from-mid").release();
    create_file(&store, "/top/from-top").release();

    let against_base = store.changes("top", Some("base")).unwrap();
    assert_eq!(
        against_base,
        vec![
            change("/from-mid", ChangeKind::Added),
            change("/from-top", ChangeKind::Added),
        ]
    );

    // Relative to mid, mid's own entry is not a change
    let against_mid = store.changes("top", Some("mid")).unwrap();
    assert_eq!(against_mid, vec![change("/from-top", ChangeKind::Added)]);
}

#[test]
fn test_changes_after_reclaim_drop_removed_marker() {
    let store = populated();
    store.sweep();

    let listing = store.changes("top", Some("base")).unwrap();
    assert_eq!(
        listing,
        vec![
            change("/conf", ChangeKind::Modified),
            change("/new", ChangeKind::Added),
        ]
    );
}

#[test]
fn test_diff_size_sums_added_and_modified_content() {
    let store = stacked_store(RemovePolicy::Defer);

    let modified = create_file(&store, "/top/conf");
    modified.write_at(0, b"override").unwrap();
    let base_conf = create_file(&store, "/base/conf");
    base_conf.write_at(0, b"original settings").unwrap();

    let removed = create_file(&store, "/top/old");
    removed.write_at(0, b"ignored once deleted").unwrap();
    store.mark_deleted(&removed);
    create_file(&store, "/base/old").release();

    create_dir(&store, "/top/dir").release();
    let added = create_file(&store, "/top/dir/new");
    added.write_at(0, b"0123456789").unwrap();

    // "override" (8) + "0123456789" (10); ancestor content is not counted
    assert_eq!(store.diff_size("top", Some("base")).unwrap(), 18);

    added.set_len(4).unwrap();
    assert_eq!(store.diff_size("top", Some("base")).unwrap(), 12);
}

#[test]
fn test_diff_size_of_empty_layer_is_zero() {
    let store = populated();
    store.create_layer("fresh", Some("top")).unwrap();

    assert_eq!(store.diff_size("fresh", Some("top")).unwrap(), 0);
    assert!(matches!(
        store.diff_size("base", Some("top")),
        Err(LayerError::NotAncestor { .. })
    ));
    assert!(store.diff_size("ghost", None).unwrap_err().is_not_found());
}

#[test]
fn test_changes_errors() {
    let store = stacked_store(RemovePolicy::Defer);
    store.create_layer("other", None).unwrap();

    assert!(matches!(
        store.changes("top", Some("other")),
        Err(LayerError::NotAncestor { .. })
    ));
    assert!(matches!(
        store.changes("base", Some("top")),
        Err(LayerError::NotAncestor { .. })
    ));
    assert!(store.changes("ghost", None).unwrap_err().is_not_found());
    assert!(store
        .changes("top", Some("ghost"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_change_kinds_display() {
    assert_eq!(ChangeKind::Added.to_string(), "A");
    assert_eq!(ChangeKind::Modified.to_string(), "M");
    assert_eq!(ChangeKind::Removed.to_string(), "D");
    assert_eq!(
        serde_json::to_string(&ChangeKind::Removed).unwrap(),
        "\"removed\""
    );
}
