//! End-to-end scanner tests against a real temporary filesystem.
//!
//! These exercise the real worker pool: thread spawning, the shared
//! `Arc<RwLock<FileTree>>`, enumeration through `OsFs`, read-job
//! completion, and the aggregation passes — with zero mocking. The
//! deterministic edge cases (fixed volume totals, injected failures,
//! hardlink groups) live in `e2e_memory.rs` against the in-memory
//! enumerator.
use dirscope_core::fs::{FsEnumerator, OsFs};
use dirscope_core::hints::HintBus;
use dirscope_core::model::{FileTree, NodeIndex, NodeKind};
use dirscope_core::scanner::progress::ScanOutcome;
use dirscope_core::scanner::{self, ScanError, ScanHandle, ScanOptions};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────

/// Create a reproducible directory tree:
///
/// ```text
/// root/
///   alpha/
///     a.txt   (100 bytes)
///     b.rs    (200 bytes)
///   beta/
///     c.png   (300 bytes)
///   d.zip     (400 bytes)
/// ```
///
/// Total file bytes: 1 000.
fn build_test_tree(root: &Path) {
    fs::create_dir_all(root.join("alpha")).unwrap();
    fs::create_dir_all(root.join("beta")).unwrap();
    write_bytes(&root.join("alpha/a.txt"), 100);
    write_bytes(&root.join("alpha/b.rs"), 200);
    write_bytes(&root.join("beta/c.png"), 300);
    write_bytes(&root.join("d.zip"), 400);
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

fn scan(path: &Path, options: ScanOptions) -> ScanHandle {
    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(false));
    let handle =
        scanner::start_scan(vec![path.to_path_buf()], options, fs, HintBus::new()).unwrap();
    assert_eq!(handle.await_completion(), ScanOutcome::Finished);
    handle
}

/// Every done container must sum its children exactly.
fn assert_aggregation_closure(tree: &FileTree, root: NodeIndex) {
    for idx in tree.walk(root) {
        let node = tree.node(idx);
        if node.children.is_empty() || !node.done {
            continue;
        }
        let mut logical = 0;
        let mut physical = 0;
        let mut last_change = 0;
        for &child in &node.children {
            let c = tree.node(child);
            logical += c.size_logical;
            physical += c.size_physical;
            last_change = last_change.max(c.last_change);
        }
        assert_eq!(node.size_logical, logical, "logical sum at {}", node.name);
        assert_eq!(node.size_physical, physical, "physical sum at {}", node.name);
        assert!(
            node.last_change >= last_change,
            "last_change must dominate descendants at {}",
            node.name
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[test]
fn scan_discovers_all_files() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    let tree = handle.live_tree.read();
    let root = handle.roots[0];

    let node = tree.node(root);
    assert!(node.done, "root must be done after completion");
    assert_eq!(node.files_count, 4);
    assert_eq!(node.folders_count, 2);
    assert_eq!(node.items_count, 6);
    assert_eq!(node.size_logical, 1_000);
    assert_aggregation_closure(&tree, root);
}

#[test]
fn scan_empty_directory() {
    let tmp = TempDir::new().unwrap();

    let handle = scan(tmp.path(), ScanOptions::default());
    let tree = handle.live_tree.read();
    let node = tree.node(handle.roots[0]);
    assert!(node.done);
    assert_eq!(node.size_logical, 0);
    assert_eq!(node.items_count, 0);
}

#[test]
fn scan_missing_root_is_unavailable() {
    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(false));
    let result = scanner::start_scan(
        vec!["/definitely/not/here".into()],
        ScanOptions::default(),
        fs,
        HintBus::new(),
    );
    assert!(matches!(result, Err(ScanError::RootUnavailable(_))));
}

#[test]
fn children_are_sorted_by_size_on_completion() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("small.bin"), 10);
    write_bytes(&tmp.path().join("large.bin"), 10_000);
    write_bytes(&tmp.path().join("medium.bin"), 500);

    let handle = scan(tmp.path(), ScanOptions::default());
    let tree = handle.live_tree.read();
    let children = &tree.node(handle.roots[0]).children;
    let sizes: Vec<u64> = children
        .iter()
        .map(|&c| tree.node(c).size_physical)
        .collect();
    let mut sorted = sizes.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sizes, sorted, "children must be size-descending");
}

#[test]
fn progress_counts_match_tree() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    let snap = handle.progress();
    let tree = handle.live_tree.read();
    let node = tree.node(handle.roots[0]);

    assert_eq!(snap.files_found, node.files_count);
    assert_eq!(snap.dirs_found, node.folders_count);
    assert_eq!(snap.tallied_bytes, node.size_physical);
    assert_eq!(snap.denied_dirs, 0);
}

#[test]
fn await_completion_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    assert_eq!(handle.await_completion(), ScanOutcome::Finished);
    assert_eq!(handle.await_completion(), ScanOutcome::Finished);
}

/// Unfollowed symlinks must be recorded as reparse leaves; with
/// `follow_symlinks` their targets are descended into.
#[cfg(unix)]
#[test]
fn symlink_follow_option() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("real")).unwrap();
    write_bytes(&tmp.path().join("real/payload.bin"), 4_096);
    std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

    let handle = scan(tmp.path(), ScanOptions::default());
    {
        let tree = handle.live_tree.read();
        let node = tree.node(handle.roots[0]);
        // The link contributes a folder but no descendants.
        assert_eq!(node.files_count, 1);
        assert_eq!(node.size_logical, 4_096);
    }

    let handle = scan(
        tmp.path(),
        ScanOptions {
            follow_symlinks: true,
            ..ScanOptions::default()
        },
    );
    let tree = handle.live_tree.read();
    let node = tree.node(handle.roots[0]);
    // The payload is now reachable both directly and through the link.
    assert_eq!(node.files_count, 2);
    assert_eq!(node.size_logical, 8_192);
}

/// Refreshing an unchanged subtree must reproduce identical aggregates.
#[test]
fn refresh_is_idempotent_on_unchanged_tree() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    let root = handle.roots[0];
    let before = shape_of(&handle.live_tree.read(), root);

    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(false));
    scanner::refresh(&handle.live_tree, &fs, root, &ScanOptions::default()).unwrap();

    let tree = handle.live_tree.read();
    assert!(tree.node(root).done, "refreshed root must be done again");
    assert_eq!(shape_of(&tree, root), before);
    assert_aggregation_closure(&tree, root);
}

/// Refresh must pick up content changes.
#[test]
fn refresh_sees_new_files() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    let root = handle.roots[0];
    write_bytes(&tmp.path().join("beta/late.dat"), 1_000);

    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(false));
    scanner::refresh(&handle.live_tree, &fs, root, &ScanOptions::default()).unwrap();

    let tree = handle.live_tree.read();
    assert_eq!(tree.node(root).files_count, 5);
    assert_eq!(tree.node(root).size_logical, 2_000);
    assert_aggregation_closure(&tree, root);
}

/// Sorted multiset of (depth, name, sizes, counts) — a structural
/// fingerprint that is independent of arena slot assignment.
fn shape_of(tree: &FileTree, root: NodeIndex) -> Vec<(usize, String, u64, u64, u64, u64, u64)> {
    let mut rows: Vec<_> = tree
        .walk(root)
        .map(|idx| {
            let node = tree.node(idx);
            (
                tree.depth(idx),
                node.name.to_string(),
                node.size_logical,
                node.size_physical,
                node.items_count,
                node.files_count,
                node.folders_count,
            )
        })
        .collect();
    rows.sort();
    rows
}

/// A scan root that is not a mount point must be a plain directory node
/// without free/unknown synthesis.
#[test]
fn directory_roots_have_no_synthetic_children() {
    let tmp = TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let handle = scan(tmp.path(), ScanOptions::default());
    let tree = handle.live_tree.read();
    let root = handle.roots[0];
    assert_eq!(tree.node(root).kind, NodeKind::Directory);
    assert!(tree.find_child_of_kind(root, NodeKind::FreeSpace).is_none());
    assert!(tree.find_child_of_kind(root, NodeKind::Unknown).is_none());
}
