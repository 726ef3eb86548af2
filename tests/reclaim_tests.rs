mod common;

use common::{create_dir, create_file, lookup, stacked_store};
use std::time::Duration;
use unionlayer::{LayerStore, Mode, RemovePolicy};

#[test]
fn test_sweep_never_frees_referenced_inode() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    let file = create_file(&store, "/base/busy");
    store.mark_deleted(&file);

    let report = store.sweep();
    assert_eq!(report.reclaimed, 0);
    assert!(file.is_deleted());

    // Still reachable, the sweep has not removed it
    let again = lookup(&store, "/base/busy");
    assert!(again.same_inode(&file));
}

#[test]
fn test_deleted_entry_disappears_after_last_release_and_sweep() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    let file = create_file(&store, "/base/gone");
    file.write_at(0, b"payload").unwrap();
    store.mark_deleted(&file);
    store.release(file);

    let report = store.sweep();
    assert_eq!(report.reclaimed, 1);

    let err = store
        .resolve("/base/gone", false, Mode::regular(0))
        .unwrap_err();
    assert!(err.is_not_found());

    // A fresh create gets a brand new, empty inode
    let recreated = create_file(&store, "/base/gone");
    assert!(!recreated.is_deleted());
    assert_eq!(recreated.len().unwrap(), 0);
}

#[test]
fn test_undeleted_unreferenced_inodes_survive_sweep() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    create_file(&store, "/base/idle").release();

    assert_eq!(store.sweep().reclaimed, 0);
    assert_eq!(
        store.registry().get("base").unwrap().ref_count("/idle"),
        Some(0)
    );
}

#[test]
fn test_reclaimed_directory_keeps_links_to_live_children() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    let dir = create_dir(&store, "/base/d");
    create_file(&store, "/base/d/f").release();

    store.mark_deleted(&dir);
    store.release(dir);
    assert_eq!(store.sweep().reclaimed, 1);

    let child = lookup(&store, "/base/d/f");
    assert_eq!(child.path(), "/d/f");
    assert!(lookup(&store, "/base").children().is_empty());

    // The recreated directory still lists the child that outlived it
    let recreated = create_dir(&store, "/base/d");
    assert!(!recreated.is_deleted());
    assert_eq!(recreated.children(), vec!["f"]);
    assert_eq!(lookup(&store, "/base").children(), vec!["d"]);
}

#[test]
fn test_reclaimed_child_is_unlinked_from_parent() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    let dir = create_dir(&store, "/base/d");
    let keep = create_file(&store, "/base/d/keep");
    let drop_me = create_file(&store, "/base/d/drop");
    assert_eq!(dir.children(), vec!["drop", "keep"]);

    store.mark_deleted(&drop_me);
    store.release(drop_me);
    store.sweep();

    assert_eq!(dir.children(), vec!["keep"]);
    drop(keep);
}

#[test]
fn test_reclaimed_derived_entry_uncovers_ancestor() {
    let store = stacked_store(RemovePolicy::Defer);
    let top_file = create_file(&store, "/top/shadowed");
    let base_file = create_file(&store, "/base/shadowed");

    store.mark_deleted(&top_file);
    store.release(top_file);
    store.sweep();

    // With the derived entry reclaimed, the ancestor's entry shows through
    let resolved = lookup(&store, "/top/shadowed");
    assert!(resolved.same_inode(&base_file));
}

#[test]
fn test_cascade_remove_reclaims_unreferenced_inodes() {
    let store = LayerStore::new(RemovePolicy::Cascade);
    store.create_layer("base", None).unwrap();
    create_dir(&store, "/base/dir").release();
    let held = create_file(&store, "/base/dir/held");
    let layer = store.registry().get("base").unwrap();

    store.remove_layer("base").unwrap();
    assert!(held.is_deleted(), "cascade marks everything deleted at once");

    let report = store.sweep();
    assert_eq!(report.reclaimed, 2, "root and /dir go, /dir/held is open");
    assert_eq!(layer.paths(), vec!["/dir/held"]);
    assert_eq!(report.layers_forgotten, 0);
    assert_eq!(report.layers_retired, 1);
    drop(layer);

    store.release(held);
    let report = store.sweep();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.layers_forgotten, 1);
    assert_eq!(store.registry().retired_count(), 0);
}

#[test]
fn test_defer_remove_leaves_inodes_until_unreferenced() {
    let store = LayerStore::new(RemovePolicy::Defer);
    store.create_layer("base", None).unwrap();
    let held = create_file(&store, "/base/held");

    store.remove_layer("base").unwrap();
    assert!(!held.is_deleted(), "defer does not flag anything up front");

    let report = store.sweep();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(store.registry().retired_count(), 1);

    store.release(held);
    let report = store.sweep();
    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.layers_forgotten, 1);
    assert_eq!(store.registry().retired_count(), 0);
}

#[test]
fn test_defer_remove_waits_for_child_layers() {
    let store = stacked_store(RemovePolicy::Defer);
    create_file(&store, "/base/lib").release();

    store.remove_layer("base").unwrap();
    store.sweep();

    // top still stacks on base, its entries must stay visible
    let lib = lookup(&store, "/top/lib");
    assert_eq!(lib.layer_id(), "base");
    drop(lib);
    assert_eq!(store.registry().retired_count(), 1);

    store.remove_layer("top").unwrap();
    let report = store.sweep();
    assert_eq!(report.layers_forgotten, 2);
    assert_eq!(report.layers_retired, 0);
    assert_eq!(store.registry().retired_count(), 0);
}

#[test]
fn test_cascade_remove_with_child_layer_hides_parent_entries() {
    let store = stacked_store(RemovePolicy::Cascade);
    create_file(&store, "/base/lib").release();

    store.remove_layer("base").unwrap();
    store.sweep();

    let err = store
        .resolve("/top/lib", false, Mode::regular(0))
        .unwrap_err();
    assert!(err.is_not_found());
    // base is emptied but kept alive by top until top goes too
    assert_eq!(store.registry().retired_count(), 1);
}

#[test]
fn test_sweep_reports_inspected_counts() {
    let store = stacked_store(RemovePolicy::Defer);
    create_file(&store, "/base/a").release();
    create_file(&store, "/top/b").release();

    let report = store.sweep();
    assert_eq!(report.inspected, 4);
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.layers_retired, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_periodic_reaper_reclaims() {
    let store = LayerStore::default();
    store.create_layer("base", None).unwrap();
    let file = create_file(&store, "/base/tmp");
    store.mark_deleted(&file);
    store.release(file);

    assert!(store.spawn_reaper(Duration::ZERO).is_none());

    let reaper = store
        .spawn_reaper(Duration::from_millis(5))
        .expect("non-zero interval starts a reaper");
    tokio::time::sleep(Duration::from_millis(100)).await;
    reaper.shutdown().await;

    assert_eq!(store.registry().get("base").unwrap().paths(), vec!["/"]);
}
