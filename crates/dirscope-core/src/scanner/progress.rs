/// Scan progress reporting — lightweight messages sent from the scan
/// threads to the caller via a crossbeam channel, plus shared atomic
/// counters for the polling `progress()` interface.
use crate::model::NodeRef;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Why a scan stopped before finishing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller asked for it.
    UserRequest,
    /// The process is going down.
    Shutdown,
    /// A structural invariant was broken — a bug, not an environment
    /// condition. The partial tree is preserved for inspection.
    InvariantViolation,
}

/// Terminal state reported by `await_completion`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Finished,
    Cancelled(CancelReason),
}

/// Progress updates sent from the scan threads to the caller.
///
/// The actual tree data is in the shared `LiveTree`; these messages carry
/// only lightweight counters and status flags.
#[derive(Debug)]
pub enum ScanEvent {
    /// Periodic update with running totals.
    Update {
        files_found: u64,
        dirs_found: u64,
        tallied_bytes: u64,
        current_path: String,
    },
    /// A directory subtree finished enumeration and aggregation.
    DirectoryCompleted { node: NodeRef },
    /// A non-fatal error (e.g. permission denied on one directory).
    Error { path: String, message: String },
    /// Scanning completed; the tree is fully aggregated.
    Complete {
        duration: Duration,
        denied_dirs: u64,
    },
    /// Scan stopped early; partial subtrees remain, marked not done.
    Cancelled { reason: CancelReason },
}

/// A completed file, fed to the top-N consumer when one is attached.
#[derive(Clone, Copy, Debug)]
pub struct FileHit {
    pub node: NodeRef,
    pub size_logical: u64,
}

/// Point-in-time view of the counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanSnapshot {
    pub tallied_bytes: u64,
    pub estimated_total_bytes: u64,
    pub files_found: u64,
    pub dirs_found: u64,
    pub denied_dirs: u64,
    pub retried_entries: u64,
}

/// Shared atomic counters updated by every worker.
#[derive(Default)]
pub struct Counters {
    pub tallied_bytes: AtomicU64,
    pub estimated_total_bytes: AtomicU64,
    pub files_found: AtomicU64,
    pub dirs_found: AtomicU64,
    pub denied_dirs: AtomicU64,
    pub retried_entries: AtomicU64,
    pub entries_seen: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            tallied_bytes: self.tallied_bytes.load(Ordering::Relaxed),
            estimated_total_bytes: self.estimated_total_bytes.load(Ordering::Relaxed),
            files_found: self.files_found.load(Ordering::Relaxed),
            dirs_found: self.dirs_found.load(Ordering::Relaxed),
            denied_dirs: self.denied_dirs.load(Ordering::Relaxed),
            retried_entries: self.retried_entries.load(Ordering::Relaxed),
        }
    }
}
