/// Worker-side of the scanner: pops directory tasks, enumerates them
/// through the abstract filesystem, and feeds the shared tree.
///
/// Each directory is one unit of work. Its entries are classified
/// (file / reparse leaf / subdirectory), inserted under a single short
/// write section, and the directory's local sums are pushed up the
/// parent chain once. Per-entry failures stay local to their directory.
use super::progress::{CancelReason, Counters, FileHit, ScanEvent};
use super::queue::{PausePoint, TaskQueue};
use super::{LiveTree, ScanOptions};
use crate::fs::{attr, EntryRecord, FsEnumerator, FsError, ReparseKind};
use crate::model::{FileTree, Node, NodeIndex, Totals};
use compact_str::CompactString;
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How often (in entries seen) an `Update` event is emitted.
const UPDATE_INTERVAL: u64 = 5_000;

/// Transient enumeration errors are retried this many times, 50 ms apart,
/// before the directory is treated as denied.
const TRANSIENT_RETRIES: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// One unit of scanner work: a directory waiting to be enumerated.
pub(crate) struct DirTask {
    pub node: NodeIndex,
    pub path: PathBuf,
}

/// Everything a worker needs, shared across the pool.
pub(crate) struct ScanContext {
    pub tree: LiveTree,
    pub fs: Arc<dyn FsEnumerator>,
    pub queue: Arc<TaskQueue<DirTask>>,
    pub options: ScanOptions,
    pub counters: Arc<Counters>,
    pub events: Sender<ScanEvent>,
    pub file_hits: Option<Sender<FileHit>>,
}

pub(crate) fn worker_loop(ctx: Arc<ScanContext>) {
    while let Some(task) = ctx.queue.pop() {
        process_dir(&ctx, task);
    }
}

fn process_dir(ctx: &ScanContext, task: DirTask) {
    let entries = match enumerate_with_retry(
        ctx.fs.as_ref(),
        &task.path,
        ctx.options.use_long_paths,
        Some(ctx.counters.as_ref()),
        Some(&*ctx.queue),
    ) {
        Ok(entries) => entries,
        Err(err) => {
            if ctx.queue.is_cancelled() {
                // Don't record errors provoked by the cancellation itself;
                // the directory stays not-done.
                return;
            }
            mark_denied(ctx, task.node);
            let _ = ctx.events.try_send(ScanEvent::Error {
                path: task.path.display().to_string(),
                message: err.to_string(),
            });
            return;
        }
    };

    if ctx.queue.is_cancelled() {
        // Leave the directory not-done; partial subtrees are preserved
        // for inspection.
        return;
    }

    let entry_count = entries.len() as u64;
    let outcome = {
        let mut tree = ctx.tree.write();
        match populate_directory(&mut tree, task.node, &task.path, entries, &ctx.options) {
            Ok(mut populated) => {
                tree.upward_add(task.node, populated.totals);
                populated.completed = tree.finish_read_job(task.node);
                populated.completed_refs = populated
                    .completed
                    .iter()
                    .map(|&i| tree.handle(i))
                    .collect();
                Ok(populated)
            }
            Err(e) => Err(e),
        }
    };

    let populated = match outcome {
        Ok(p) => p,
        Err(e) => {
            // Structural corruption is a bug: stop the scan and surface it.
            warn!("invariant violation under {}: {e}", task.path.display());
            ctx.queue.cancel(CancelReason::InvariantViolation);
            let _ = ctx.events.try_send(ScanEvent::Error {
                path: task.path.display().to_string(),
                message: e.to_string(),
            });
            return;
        }
    };

    // Outside the lock: queue follow-up work and publish progress.
    for pending in populated.pending {
        ctx.queue.push(pending);
    }
    if let Some(feed) = &ctx.file_hits {
        for hit in populated.file_hits {
            let _ = feed.send(FileHit {
                node: hit.node,
                size_logical: hit.size_logical,
            });
        }
    }
    for node in populated.completed_refs {
        let _ = ctx.events.try_send(ScanEvent::DirectoryCompleted { node });
    }

    ctx.counters
        .files_found
        .fetch_add(populated.files, Ordering::Relaxed);
    ctx.counters
        .dirs_found
        .fetch_add(populated.dirs, Ordering::Relaxed);
    ctx.counters
        .tallied_bytes
        .fetch_add(populated.totals.size_physical, Ordering::Relaxed);

    let seen = ctx
        .counters
        .entries_seen
        .fetch_add(entry_count, Ordering::Relaxed)
        + entry_count;
    if seen / UPDATE_INTERVAL != seen.saturating_sub(entry_count) / UPDATE_INTERVAL {
        let snap = ctx.counters.snapshot();
        let _ = ctx.events.try_send(ScanEvent::Update {
            files_found: snap.files_found,
            dirs_found: snap.dirs_found,
            tallied_bytes: snap.tallied_bytes,
            current_path: task.path.display().to_string(),
        });
    }
}

fn mark_denied(ctx: &ScanContext, node: NodeIndex) {
    ctx.counters.denied_dirs.fetch_add(1, Ordering::Relaxed);
    let completed = {
        let mut tree = ctx.tree.write();
        tree.node_mut(node).is_error = true;
        let completed = tree.finish_read_job(node);
        completed.iter().map(|&i| tree.handle(i)).collect::<Vec<_>>()
    };
    for node in completed {
        let _ = ctx.events.try_send(ScanEvent::DirectoryCompleted { node });
    }
}

/// Enumerate a directory, retrying the transient error class.
pub(crate) fn enumerate_with_retry(
    fs: &dyn FsEnumerator,
    path: &std::path::Path,
    use_long_paths: bool,
    counters: Option<&Counters>,
    pause: Option<&dyn PausePoint>,
) -> Result<Vec<EntryRecord>, FsError> {
    let mut attempt = 0;
    loop {
        match fs.read_dir(path, use_long_paths) {
            Ok(entries) => return Ok(entries),
            Err(e) if e.is_transient() && attempt < TRANSIENT_RETRIES => {
                attempt += 1;
                if let Some(c) = counters {
                    c.retried_entries.fetch_add(1, Ordering::Relaxed);
                }
                std::thread::sleep(RETRY_BACKOFF);
                if let Some(p) = pause {
                    if p.pause_point().is_err() {
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

pub(crate) struct FilePending {
    pub node: crate::model::NodeRef,
    pub size_logical: u64,
}

#[derive(Default)]
pub(crate) struct Populated {
    pub pending: Vec<DirTask>,
    pub totals: Totals,
    pub file_hits: Vec<FilePending>,
    pub completed: Vec<NodeIndex>,
    pub completed_refs: Vec<crate::model::NodeRef>,
    pub files: u64,
    pub dirs: u64,
}

/// Insert a directory's entries under `dir`. Children are attached without
/// propagation; the accumulated `totals` must be pushed up by the caller
/// in the same write section.
pub(crate) fn populate_directory(
    tree: &mut FileTree,
    dir: NodeIndex,
    dir_path: &std::path::Path,
    entries: Vec<EntryRecord>,
    options: &ScanOptions,
) -> Result<Populated, crate::model::TreeError> {
    let mut out = Populated::default();

    for entry in entries {
        let followed = match entry.reparse {
            ReparseKind::None => true,
            ReparseKind::MountPoint => options.follow_mount_points,
            ReparseKind::Junction => options.follow_junctions,
            ReparseKind::Symlink => options.follow_symlinks,
        };

        if entry.is_directory {
            let mut node = Node::new_dir(CompactString::new(&entry.name));
            node.attributes = entry.attributes;
            node.last_change = entry.last_change;
            node.owner = entry.owner.as_deref().map(CompactString::new);
            if !followed {
                // Unfollowed reparse points are leaves: visible, counted,
                // never descended into.
                node.attributes |= attr::REPARSE;
                node.read_jobs = 0;
                node.done = true;
            }
            let idx = tree.add_node(node);
            tree.add_child(dir, idx, false)?;
            out.totals.merge(Totals::of(tree.node(idx)));
            out.dirs += 1;
            if followed {
                out.pending.push(DirTask {
                    node: idx,
                    path: dir_path.join(&entry.name),
                });
            }
        } else {
            let mut node = Node::new_file(
                CompactString::new(&entry.name),
                entry.size_logical,
                entry.size_physical,
            );
            node.attributes = entry.attributes;
            node.last_change = entry.last_change;
            node.file_index = entry.file_index;
            node.owner = entry.owner.as_deref().map(CompactString::new);
            let idx = tree.add_node(node);
            tree.add_child(dir, idx, false)?;
            out.totals.merge(Totals::of(tree.node(idx)));
            out.files += 1;
            out.file_hits.push(FilePending {
                node: tree.handle(idx),
                size_logical: entry.size_logical,
            });
        }
    }

    Ok(out)
}
