//! Watcher end-to-end: change events stream in on a channel and must be
//! reflected into the completed tree under the single-writer discipline.
use dirscope_core::fs::{FsEnumerator, MemoryFs};
use dirscope_core::hints::{Hint, HintBus};
use dirscope_core::model::NodeKind;
use dirscope_core::scanner::progress::ScanOutcome;
use dirscope_core::scanner::{self, LiveTree, ScanOptions};
use dirscope_core::watcher::{start_watcher, ChangeAction, ChangeEvent, WatcherHandle};
use dirscope_core::analysis::{search, SearchQuery};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Fixture {
    fs: Arc<MemoryFs>,
    tree: LiveTree,
    root: dirscope_core::model::NodeIndex,
    changes: Sender<ChangeEvent>,
    watcher: WatcherHandle,
    hints: HintBus,
}

fn fixture() -> Fixture {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/data/a.bin", 100);
    fs.add_file("/data/sub/b.bin", 200);

    let enumerator: Arc<dyn FsEnumerator> = fs.clone();
    let hints = HintBus::new();
    let handle = scanner::start_scan(
        vec![PathBuf::from("/data")],
        ScanOptions {
            threads: 2,
            ..ScanOptions::default()
        },
        enumerator.clone(),
        hints.clone(),
    )
    .unwrap();
    assert_eq!(handle.await_completion(), ScanOutcome::Finished);
    let root = handle.roots[0];

    let (tx, rx) = crossbeam_channel::unbounded();
    let watcher = start_watcher(
        handle.live_tree.clone(),
        enumerator,
        root,
        rx,
        ScanOptions::default(),
        hints.clone(),
    );

    Fixture {
        fs,
        tree: handle.live_tree,
        root,
        changes: tx,
        watcher,
        hints,
    }
}

/// Poll until `check` passes or a generous deadline expires.
fn wait_for(tree: &LiveTree, check: impl Fn(&dirscope_core::model::FileTree) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if check(&tree.read()) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "watcher did not apply the change in time"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn added_file_propagates_sums() {
    let fx = fixture();
    fx.fs.add_file("/data/new.bin", 50);
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("new.bin"),
            action: ChangeAction::Added,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| {
        tree.node(fx.root).size_logical == 350 && tree.node(fx.root).files_count == 3
    });
    let tree = fx.tree.read();
    assert!(tree.node(fx.root).done, "tree stays done after the update");
    fx.watcher.join();
}

#[test]
fn added_directory_is_enumerated_recursively() {
    let fx = fixture();
    fx.fs.add_file("/data/fresh/deep/c.bin", 1_000);
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("fresh"),
            action: ChangeAction::Added,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| tree.node(fx.root).size_logical == 1_300);
    let tree = fx.tree.read();
    assert_eq!(tree.node(fx.root).folders_count, 3, "sub, fresh, deep");
    assert!(tree.node(fx.root).done);
    fx.watcher.join();
}

#[test]
fn removed_subtree_is_subtracted_and_announced() {
    let fx = fixture();
    let hint_rx = fx.hints.subscribe();

    let removed_idx = {
        let tree = fx.tree.read();
        tree.find_by_path(fx.root, &PathBuf::from("/data/sub")).unwrap()
    };
    let removed_ref = fx.tree.read().handle(removed_idx);

    fx.fs.remove_entry("/data/sub");
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("sub"),
            action: ChangeAction::Removed,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| tree.node(fx.root).size_logical == 100);
    {
        let tree = fx.tree.read();
        assert_eq!(tree.node(fx.root).folders_count, 0);
        assert!(tree.resolve(removed_ref).is_none(), "weak ref must die");
    }

    // The removal is announced so weak holders can detach.
    loop {
        match hint_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Hint::NodeRemoved(node)) => {
                assert_eq!(node, removed_ref);
                break;
            }
            Ok(_) => continue,
            Err(e) => panic!("no NodeRemoved hint: {e}"),
        }
    }
    fx.watcher.join();
}

#[test]
fn modified_file_applies_delta() {
    let fx = fixture();
    fx.fs.update_file("/data/a.bin", 700);
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("a.bin"),
            action: ChangeAction::Modified,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| tree.node(fx.root).size_logical == 900);
    let tree = fx.tree.read();
    let file = tree
        .find_by_path(fx.root, &PathBuf::from("/data/a.bin"))
        .unwrap();
    assert_eq!(tree.node(file).size_logical, 700);
    fx.watcher.join();
}

#[test]
fn rename_moves_the_node() {
    let fx = fixture();
    fx.fs.remove_entry("/data/a.bin");
    fx.fs.add_file("/data/renamed.bin", 100);
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("renamed.bin"),
            action: ChangeAction::Renamed {
                old: PathBuf::from("a.bin"),
            },
        })
        .unwrap();

    wait_for(&fx.tree, |tree| {
        tree.find_by_path(fx.root, &PathBuf::from("/data/renamed.bin"))
            .is_some()
    });
    let tree = fx.tree.read();
    assert!(tree
        .find_by_path(fx.root, &PathBuf::from("/data/a.bin"))
        .is_none());
    assert_eq!(tree.node(fx.root).size_logical, 300, "totals unchanged");
    fx.watcher.join();
}

#[test]
fn overflow_refreshes_the_subtree() {
    let fx = fixture();
    // Several changes the watcher never saw individually.
    fx.fs.add_file("/data/sub/x1.bin", 10);
    fx.fs.add_file("/data/sub/x2.bin", 20);
    fx.fs.remove_entry("/data/sub/b.bin");
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("sub"),
            action: ChangeAction::Overflow,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| tree.node(fx.root).size_logical == 130);
    let tree = fx.tree.read();
    let sub = tree
        .find_by_path(fx.root, &PathBuf::from("/data/sub"))
        .unwrap();
    assert_eq!(tree.node(sub).files_count, 2);
    assert!(tree.node(sub).done);
    fx.watcher.join();
}

/// Search results must drop hits for nodes the watcher removed.
#[test]
fn search_results_detach_on_removal() {
    let fx = fixture();
    let hint_rx = fx.hints.subscribe();

    let mut results = {
        let tree = fx.tree.read();
        search(&tree, fx.root, &SearchQuery::glob("*.bin")).unwrap()
    };
    assert_eq!(results.len(), 2);

    fx.fs.remove_entry("/data/a.bin");
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("a.bin"),
            action: ChangeAction::Removed,
        })
        .unwrap();

    wait_for(&fx.tree, |tree| tree.node(fx.root).files_count == 1);
    results.apply_hints(&hint_rx);
    assert_eq!(results.len(), 1);
    assert_eq!(results.hits()[0].name, "b.bin");
    fx.watcher.join();
}

/// Paths that do not resolve (behind an unfollowed boundary, or already
/// gone) are ignored without disturbing the tree.
#[test]
fn unresolvable_paths_are_ignored() {
    let fx = fixture();
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("ghost/phantom.bin"),
            action: ChangeAction::Removed,
        })
        .unwrap();
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("ghost/phantom.bin"),
            action: ChangeAction::Modified,
        })
        .unwrap();

    // A subsequent valid change still lands, proving the thread survived.
    fx.fs.add_file("/data/after.bin", 5);
    fx.changes
        .send(ChangeEvent {
            path: PathBuf::from("after.bin"),
            action: ChangeAction::Added,
        })
        .unwrap();
    wait_for(&fx.tree, |tree| tree.node(fx.root).size_logical == 305);
    fx.watcher.join();
}

/// Stop is prompt and idempotent; events after stop are not applied.
#[test]
fn stop_halts_processing() {
    let fx = fixture();
    fx.watcher.join();
    fx.watcher.join();

    fx.fs.add_file("/data/late.bin", 999);
    let _ = fx.changes.send(ChangeEvent {
        path: PathBuf::from("late.bin"),
        action: ChangeAction::Added,
    });
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(fx.tree.read().node(fx.root).size_logical, 300);

    // Synthetic sanity: the fixture tree is what we think it is.
    let tree = fx.tree.read();
    assert_eq!(tree.node(fx.root).kind, NodeKind::Directory);
}
