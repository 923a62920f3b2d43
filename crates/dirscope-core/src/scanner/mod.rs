/// Scanner module — orchestrates the parallel filesystem crawl.
///
/// A pool of worker threads pops *directory tasks* from a shared
/// [`queue::TaskQueue`]; each task enumerates one directory through the
/// abstract [`FsEnumerator`], inserts the entries into a **shared
/// `LiveTree`** (`Arc<RwLock<FileTree>>`), pushes its subdirectories as
/// new tasks, and retires its read job. When the queue drains and every
/// worker idles, the orchestrator thread runs the aggregation passes
/// (free/unknown synthesis and hardlink billing) and emits `Complete`.
///
/// Suspend, resume and cancel are cooperative and idempotent; workers
/// observe them at directory boundaries, the duplicate hasher between
/// I/O chunks. `await_completion` returns only after every thread joined.
pub mod progress;
pub mod queue;
mod worker;

use crate::aggregate;
use crate::fs::{FsEnumerator, FsError};
use crate::hints::{Hint, HintBus};
use crate::model::{FileTree, Node, NodeIndex, TreeError};
use compact_str::CompactString;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use progress::{
    CancelReason, Counters, FileHit, ScanEvent, ScanOutcome, ScanSnapshot,
};
use queue::TaskQueue;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use worker::{enumerate_with_retry, populate_directory, DirTask, ScanContext};

/// A shared, concurrently-readable scan tree.
///
/// Workers hold the write lock briefly when inserting a directory's
/// entries; readers (presenters, layout, derived views) take read locks.
pub type LiveTree = Arc<RwLock<FileTree>>;

/// Maximum number of progress messages that may queue up in the events
/// channel. Advisory messages are sent best-effort (`try_send`) so a slow
/// or absent consumer never stalls the workers; `await_completion` is the
/// authoritative way to learn the outcome.
pub const EVENT_CHANNEL_CAPACITY: usize = 4_096;

/// Capacity of the top-N file feed. A full feed back-pressures the
/// workers rather than growing without bound.
pub const FILE_FEED_CAPACITY: usize = 4_096;

/// Scan configuration. Mirrors the CLI flags one-to-one.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Worker pool size; defaults to the CPU count.
    pub threads: usize,
    pub follow_junctions: bool,
    pub follow_mount_points: bool,
    pub follow_symlinks: bool,
    /// Resolve per-entry owners (the enumerator must be built with owner
    /// lookups enabled as well).
    pub compute_owner: bool,
    pub scan_for_duplicates: bool,
    pub use_long_paths: bool,
    /// Size of the largest-files view; 0 disables the feed.
    pub top_files: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            follow_junctions: false,
            follow_mount_points: false,
            follow_symlinks: false,
            compute_owner: false,
            scan_for_duplicates: false,
            use_long_paths: false,
            top_files: 0,
        }
    }
}

/// Errors surfaced to the caller of `start_scan`. Everything else is
/// reflected in the tree and the progress counters.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("root unavailable: {0}")]
    RootUnavailable(PathBuf),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Handle to a running or completed scan.
pub struct ScanHandle {
    /// Shared tree, populated incrementally while the scan runs.
    pub live_tree: LiveTree,
    /// Best-effort progress events; drain while waiting if you want them.
    pub events: Receiver<ScanEvent>,
    /// Indices of the scan roots (one drive/directory, or one MyComputer).
    pub roots: Vec<NodeIndex>,
    file_hits: Mutex<Option<Receiver<FileHit>>>,
    queue: Arc<TaskQueue<DirTask>>,
    counters: Arc<Counters>,
    orchestrator: Mutex<Option<thread::JoinHandle<ScanOutcome>>>,
    outcome: Mutex<Option<ScanOutcome>>,
}

impl ScanHandle {
    /// Block new directory pops; running tasks finish their current
    /// directory first. Idempotent.
    pub fn suspend(&self) {
        self.queue.suspend();
    }

    /// Undo `suspend`. Idempotent.
    pub fn resume(&self) {
        self.queue.resume();
    }

    /// Request cancellation. Partial subtrees are preserved (not done);
    /// the reason comes back from `await_completion`. Idempotent.
    pub fn cancel(&self, reason: CancelReason) {
        self.queue.cancel(reason);
    }

    pub fn is_suspended(&self) -> bool {
        self.queue.is_suspended()
    }

    /// Current `(tallied, estimated_total)` plus the failure counters.
    pub fn progress(&self) -> ScanSnapshot {
        self.counters.snapshot()
    }

    /// Take the largest-files feed (present when `top_files > 0`).
    pub fn take_file_hits(&self) -> Option<Receiver<FileHit>> {
        self.file_hits.lock().take()
    }

    /// Wait for every scanner thread to join and return the outcome.
    /// Idempotent: later calls return the recorded outcome.
    pub fn await_completion(&self) -> ScanOutcome {
        if let Some(done) = *self.outcome.lock() {
            return done;
        }
        let joined = self
            .orchestrator
            .lock()
            .take()
            .map(|handle| match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("scan orchestrator panicked");
                    ScanOutcome::Cancelled(CancelReason::Shutdown)
                }
            });
        let mut slot = self.outcome.lock();
        if let Some(outcome) = joined {
            *slot = Some(outcome);
        }
        (*slot).unwrap_or(ScanOutcome::Cancelled(CancelReason::Shutdown))
    }
}

/// Start a scan of `roots` on background threads.
///
/// A single root becomes the tree root (a drive when it is a volume mount
/// point, a plain directory otherwise); multiple roots hang under a
/// synthetic MyComputer container. A root that does not exist yields
/// `RootUnavailable` when it is the only one; with several roots the
/// missing ones become error placeholders and the rest are scanned.
pub fn start_scan(
    roots: Vec<PathBuf>,
    options: ScanOptions,
    fs: Arc<dyn FsEnumerator>,
    hints: HintBus,
) -> Result<ScanHandle, ScanError> {
    let live_tree: LiveTree = Arc::new(RwLock::new(FileTree::with_capacity(65_536)));
    let queue = Arc::new(TaskQueue::new(options.threads.max(1)));
    let counters = Arc::new(Counters::default());
    let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
    let (hits_tx, hits_rx) = if options.top_files > 0 {
        let (tx, rx) = crossbeam_channel::bounded(FILE_FEED_CAPACITY);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    // Probe roots before spawning anything.
    let mut available = Vec::new();
    let mut missing = Vec::new();
    for path in &roots {
        match fs.stat(path) {
            Err(FsError::NotFound(_)) => missing.push(path.clone()),
            _ => available.push(path.clone()),
        }
    }
    if available.is_empty() {
        let path = missing
            .first()
            .cloned()
            .unwrap_or_default();
        hints.publish(Hint::ScanTerminated(format!(
            "root unavailable: {}",
            path.display()
        )));
        return Err(ScanError::RootUnavailable(path));
    }
    for path in &missing {
        hints.publish(Hint::ScanTerminated(format!(
            "root unavailable: {}",
            path.display()
        )));
    }

    // Build the root layer and seed the queue.
    let root_nodes: Vec<NodeIndex>;
    let mut drive_roots: Vec<(NodeIndex, PathBuf)> = Vec::new();
    {
        let mut tree = live_tree.write();
        let container = (roots.len() > 1).then(|| {
            tree.add_root(Node::new_my_computer(CompactString::new("My Computer")))
        });

        for path in &roots {
            let name = CompactString::new(path.display().to_string());
            let node = if missing.contains(path) {
                Node::new_error(crate::model::NodeKind::Directory, name, 0)
            } else if fs.is_volume_root(path) {
                Node::new_drive(name, path.clone())
            } else {
                let mut dir = Node::new_dir(name);
                dir.full_path = Some(path.clone());
                dir
            };
            let is_scannable = !node.is_error;
            let idx = match container {
                Some(parent) => {
                    let idx = tree.add_node(node);
                    tree.add_child(parent, idx, true)?;
                    idx
                }
                None => tree.add_root(node),
            };
            if is_scannable {
                drive_roots.push((idx, path.clone()));
                queue.push(DirTask {
                    node: idx,
                    path: path.clone(),
                });
                if let Ok(vol) = fs.volume(path) {
                    counters
                        .estimated_total_bytes
                        .fetch_add(vol.used(), Ordering::Relaxed);
                }
            }
        }
        root_nodes = match container {
            Some(c) => vec![c],
            None => tree.roots.clone(),
        };
    }
    hints.publish(Hint::NewRoot);

    let ctx = Arc::new(ScanContext {
        tree: live_tree.clone(),
        fs: fs.clone(),
        queue: queue.clone(),
        options: options.clone(),
        counters: counters.clone(),
        events: events_tx.clone(),
        file_hits: hits_tx,
    });

    let orchestrator = {
        let queue = queue.clone();
        let counters = counters.clone();
        let scan_roots = drive_roots.clone();
        let threads = options.threads.max(1);
        thread::Builder::new()
            .name("dirscope-scan".into())
            .spawn(move || {
                info!("starting scan, {} worker(s)", threads);
                let start = Instant::now();

                let workers: Vec<_> = (0..threads)
                    .map(|i| {
                        let wctx = ctx.clone();
                        thread::Builder::new()
                            .name(format!("dirscope-worker-{i}"))
                            .spawn(move || worker::worker_loop(wctx))
                            .expect("failed to spawn scanner worker")
                    })
                    .collect();
                for w in workers {
                    let _ = w.join();
                }

                if let Some(reason) = queue.cancel_reason() {
                    if reason == CancelReason::InvariantViolation {
                        hints.publish(Hint::ScanTerminated(
                            "scan aborted: invariant violation".into(),
                        ));
                    }
                    let _ = ctx.events.try_send(ScanEvent::Cancelled { reason });
                    return ScanOutcome::Cancelled(reason);
                }

                // All directories done: synthesize per-root children and
                // re-bill hardlinks, then restore the done chain.
                {
                    let mut tree = ctx.tree.write();
                    for (root, path) in &scan_roots {
                        let stats = ctx.fs.volume(path).ok();
                        aggregate::finish_root(&mut tree, *root, stats);
                    }
                }

                let snap = counters.snapshot();
                let duration = start.elapsed();
                info!(
                    "scan complete: {} files, {} dirs in {:?}",
                    snap.files_found, snap.dirs_found, duration
                );
                let _ = ctx.events.try_send(ScanEvent::Complete {
                    duration,
                    denied_dirs: snap.denied_dirs,
                });
                ScanOutcome::Finished
            })
            .expect("failed to spawn scan orchestrator")
    };

    Ok(ScanHandle {
        live_tree,
        events: events_rx,
        roots: root_nodes,
        file_hits: Mutex::new(hits_rx),
        queue,
        counters,
        orchestrator: Mutex::new(Some(orchestrator)),
        outcome: Mutex::new(None),
    })
}

/// Serially re-enumerate the subtree rooted at `idx`, destroying the old
/// children first. Used for explicit refreshes and for watcher overflow
/// recovery. A refresh of an unchanged subtree reproduces bit-identical
/// aggregates.
pub fn refresh(
    tree: &LiveTree,
    fs: &Arc<dyn FsEnumerator>,
    idx: NodeIndex,
    options: &ScanOptions,
) -> Result<(), ScanError> {
    let path = {
        let mut guard = tree.write();
        let path = guard.full_path(idx);
        let children = guard.node(idx).children.clone();
        for child in children {
            guard.remove_child(idx, child)?;
        }
        let node = guard.node_mut(idx);
        node.is_error = false;
        node.read_jobs = 0;
        node.done = false;
        guard.upward_set_undone(idx);
        guard.upward_add_read_jobs(idx, 1);
        path
    };

    scan_subtree_serial(tree, fs, idx, &path, options)?;

    // Re-synthesize drive children (or recompute the parent drive's
    // unknown slice when an interior subtree was refreshed).
    let mut guard = tree.write();
    let kind = guard.node(idx).kind;
    if kind == crate::model::NodeKind::Drive {
        let stats = fs.volume(&path).ok();
        aggregate::finish_root(&mut guard, idx, stats);
    } else if let Some(drive) = guard.parent_drive(idx) {
        let drive_path = guard.full_path(drive);
        if let Ok(stats) = fs.volume(&drive_path) {
            aggregate::update_unknown(&mut guard, drive, stats);
        }
        guard.upward_restore_done(idx);
    } else {
        // Plain directory root: run hardlink billing like a fresh scan.
        aggregate::finish_root(&mut guard, idx, None);
    }
    Ok(())
}

/// Serially enumerate `dir` (which must hold its own pending read job)
/// and everything below it. Shared by `refresh` and the watcher's
/// added-directory path.
pub(crate) fn scan_subtree_serial(
    tree: &LiveTree,
    fs: &Arc<dyn FsEnumerator>,
    dir: NodeIndex,
    path: &Path,
    options: &ScanOptions,
) -> Result<(), ScanError> {
    let entries = match enumerate_with_retry(fs.as_ref(), path, options.use_long_paths, None, None)
    {
        Ok(entries) => entries,
        Err(_) => {
            let mut guard = tree.write();
            guard.node_mut(dir).is_error = true;
            guard.finish_read_job(dir);
            return Ok(());
        }
    };

    let pending = {
        let mut guard = tree.write();
        let populated = populate_directory(&mut guard, dir, path, entries, options)?;
        guard.upward_add(dir, populated.totals);
        guard.finish_read_job(dir);
        populated.pending
    };

    for task in pending {
        scan_subtree_serial(tree, fs, task.node, &task.path, options)?;
    }
    Ok(())
}
