/// Change watcher — reflects filesystem notifications into the tree.
///
/// Consumes the abstract per-root change stream (a cancellable crossbeam
/// receiver fed by the platform notification collaborator) on its own
/// thread and applies each event under the tree's write lock:
///
/// - `Added` → create the node (directories are enumerated recursively)
///   and propagate sums.
/// - `Removed` → subtract and destroy the subtree, then announce
///   [`Hint::NodeRemoved`] so weak holders detach.
/// - `Modified` on a file → diff size/attributes/timestamp and propagate
///   the deltas. `Modified` on a directory is ignored — its children's
///   modifications surface on their own.
/// - `Renamed` → removed + added.
/// - `Overflow` → the notification buffer overran; re-enumerate the
///   affected subtree.
///
/// Paths that do not resolve in the tree (e.g. behind an unfollowed
/// reparse point) are ignored. The thread polls its cancel flag every
/// 200 ms between waits and exits promptly on `stop`.
use crate::fs::FsEnumerator;
use crate::hints::{Hint, HintBus};
use crate::model::{Node, NodeIndex, NodeKind, Totals};
use crate::scanner::{self, LiveTree, ScanOptions};
use compact_str::CompactString;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How a watched path changed.
#[derive(Clone, Debug)]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    /// The entry moved; `old` is the previous root-relative path, the
    /// event's own path is the new one.
    Renamed { old: PathBuf },
    /// The notification buffer overflowed; everything under the event
    /// path must be re-enumerated.
    Overflow,
}

/// One notification from the change stream, with a root-relative path.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub action: ChangeAction,
}

/// Handle to a running watcher thread.
pub struct WatcherHandle {
    cancel: Arc<AtomicBool>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WatcherHandle {
    /// Signal the thread to stop. Non-blocking; the thread exits within
    /// one poll interval.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the thread to exit.
    pub fn join(&self) {
        self.stop();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Start watching `root` (a node in `tree`) for changes arriving on
/// `changes`. One thread per watched root.
pub fn start_watcher(
    tree: LiveTree,
    fs: Arc<dyn FsEnumerator>,
    root: NodeIndex,
    changes: Receiver<ChangeEvent>,
    options: ScanOptions,
    hints: HintBus,
) -> WatcherHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();

    let thread = thread::Builder::new()
        .name("dirscope-watcher".into())
        .spawn(move || {
            let root_path = tree.read().full_path(root);
            debug!("watcher started on {}", root_path.display());
            loop {
                if cancel_flag.load(Ordering::Relaxed) {
                    break;
                }
                match changes.recv_timeout(Duration::from_millis(200)) {
                    Ok(event) => {
                        apply_change(&tree, &fs, root, &root_path, event, &options, &hints)
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("watcher stopped for {}", root_path.display());
        })
        .expect("failed to spawn watcher thread");

    WatcherHandle {
        cancel,
        thread: Mutex::new(Some(thread)),
    }
}

fn apply_change(
    tree: &LiveTree,
    fs: &Arc<dyn FsEnumerator>,
    root: NodeIndex,
    root_path: &Path,
    event: ChangeEvent,
    options: &ScanOptions,
    hints: &HintBus,
) {
    let full = root_path.join(&event.path);
    match event.action {
        ChangeAction::Added => added(tree, fs, root, &full, options),
        ChangeAction::Removed => removed(tree, root, &full, hints),
        ChangeAction::Modified => modified(tree, fs, root, &full),
        ChangeAction::Renamed { old } => {
            removed(tree, root, &root_path.join(old), hints);
            added(tree, fs, root, &full, options);
        }
        ChangeAction::Overflow => overflow(tree, fs, root, &full, options),
    }
}

fn added(
    tree: &LiveTree,
    fs: &Arc<dyn FsEnumerator>,
    root: NodeIndex,
    full: &Path,
    options: &ScanOptions,
) {
    if tree.read().find_by_path(root, full).is_some() {
        // Some sources report create + write as two Added events.
        modified(tree, fs, root, full);
        return;
    }
    let Some(parent_path) = full.parent() else {
        return;
    };
    let record = match fs.stat(full) {
        Ok(r) => r,
        Err(e) => {
            debug!("stat for added {} failed: {e}", full.display());
            return;
        }
    };

    let new_dir = {
        let mut guard = tree.write();
        let Some(parent) = guard.find_by_path(root, parent_path) else {
            return;
        };
        if guard.node(parent).is_leaf() {
            return;
        }
        let mut node = if record.is_directory {
            Node::new_dir(CompactString::new(&record.name))
        } else {
            let mut n = Node::new_file(
                CompactString::new(&record.name),
                record.size_logical,
                record.size_physical,
            );
            n.file_index = record.file_index;
            n
        };
        node.attributes = record.attributes;
        node.last_change = record.last_change;
        let idx = guard.add_node(node);
        let is_dir = record.is_directory;
        if guard.add_child(parent, idx, true).is_err() {
            warn!("watcher: could not attach {}", full.display());
            return;
        }
        if !is_dir {
            guard.node_mut(idx).done = true;
            guard.upward_restore_done(parent);
            return;
        }
        Some(idx)
    };

    // New directory: enumerate its contents synchronously.
    if let Some(idx) = new_dir {
        if scanner::scan_subtree_serial(tree, fs, idx, full, options).is_ok() {
            let mut guard = tree.write();
            guard.upward_restore_done(idx);
        }
    }
}

fn removed(tree: &LiveTree, root: NodeIndex, full: &Path, hints: &HintBus) {
    let removed_ref = {
        let mut guard = tree.write();
        let Some(idx) = guard.find_by_path(root, full) else {
            return;
        };
        if idx == root {
            return;
        }
        let Some(parent) = guard.node(idx).parent else {
            return;
        };
        let weak = guard.handle(idx);
        if guard.remove_child(parent, idx).is_err() {
            return;
        }
        guard.upward_restore_done(parent);
        weak
    };
    hints.publish(Hint::NodeRemoved(removed_ref));
}

fn modified(tree: &LiveTree, fs: &Arc<dyn FsEnumerator>, root: NodeIndex, full: &Path) {
    let record = match fs.stat(full) {
        Ok(r) => r,
        Err(e) => {
            debug!("stat for modified {} failed: {e}", full.display());
            return;
        }
    };
    if record.is_directory {
        // Directory modifications surface through their children.
        return;
    }
    let mut guard = tree.write();
    let Some(idx) = guard.find_by_path(root, full) else {
        return;
    };
    if guard.node(idx).kind != NodeKind::File {
        return;
    }

    let (old_logical, old_physical) = {
        let node = guard.node(idx);
        (node.size_logical, node.size_physical)
    };
    guard.upward_subtract(
        idx,
        Totals {
            size_logical: old_logical,
            size_physical: old_physical,
            ..Totals::default()
        },
    );
    guard.upward_add(
        idx,
        Totals {
            size_logical: record.size_logical,
            size_physical: record.size_physical,
            last_change: record.last_change,
            ..Totals::default()
        },
    );
    let node = guard.node_mut(idx);
    node.attributes = record.attributes;
    node.last_change = record.last_change;
}

fn overflow(
    tree: &LiveTree,
    fs: &Arc<dyn FsEnumerator>,
    root: NodeIndex,
    full: &Path,
    options: &ScanOptions,
) {
    let target = {
        let guard = tree.read();
        match guard.find_by_path(root, full) {
            // Overflow recovery re-enumerates a directory; climb out of
            // leaves first.
            Some(idx) if guard.node(idx).is_leaf() => guard.node(idx).parent.unwrap_or(root),
            Some(idx) => idx,
            None => root,
        }
    };
    debug!("notification overflow, refreshing {}", full.display());
    if let Err(e) = scanner::refresh(tree, fs, target, options) {
        warn!("overflow refresh of {} failed: {e}", full.display());
    }
}
