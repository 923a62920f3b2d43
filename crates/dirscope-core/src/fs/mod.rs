/// Abstract filesystem interface consumed by the scanner and watcher.
///
/// The engine never touches the OS directly for enumeration — everything
/// goes through [`FsEnumerator`], which the default [`OsFs`] implements
/// with `std::fs` and which [`MemoryFs`] implements deterministically for
/// the test-suite. Failure modes are recoverable at the directory
/// granularity: one unreadable directory never aborts a scan.
pub mod memory;
pub mod os;

pub use memory::MemoryFs;
pub use os::OsFs;

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Attribute bitset carried on every entry. The positions double as the
/// positional flags of the report format.
pub mod attr {
    pub const READ_ONLY: u32 = 1 << 0;
    pub const HIDDEN: u32 = 1 << 1;
    pub const SYSTEM: u32 = 1 << 2;
    pub const ARCHIVE: u32 = 1 << 3;
    pub const COMPRESSED: u32 = 1 << 4;
    pub const ENCRYPTED: u32 = 1 << 5;
    pub const REPARSE: u32 = 1 << 6;
    pub const SPARSE: u32 = 1 << 7;
}

/// Render attributes as the 8-character positional field of the report:
/// `rhsacepz`, with `-` for absent bits and `????????` when unknown.
pub fn format_attributes(attributes: Option<u32>) -> String {
    let Some(bits) = attributes else {
        return "????????".into();
    };
    const FLAGS: [(u32, char); 8] = [
        (attr::READ_ONLY, 'r'),
        (attr::HIDDEN, 'h'),
        (attr::SYSTEM, 's'),
        (attr::ARCHIVE, 'a'),
        (attr::COMPRESSED, 'c'),
        (attr::ENCRYPTED, 'e'),
        (attr::REPARSE, 'p'),
        (attr::SPARSE, 'z'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, ch)| if bits & bit != 0 { ch } else { '-' })
        .collect()
}

/// Kind of redirection a directory-like entry performs.
///
/// Junctions are a Windows-only kind that shares an OS tag with mount
/// points there; enumerators on other platforms simply never produce them.
/// The scanner's `follow_*` options are keyed on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReparseKind {
    None,
    MountPoint,
    Junction,
    Symlink,
}

/// One record yielded by a directory enumeration.
#[derive(Clone, Debug)]
pub struct EntryRecord {
    pub name: String,
    pub is_directory: bool,
    pub reparse: ReparseKind,
    pub size_logical: u64,
    /// Allocated bytes on disk; differs from `size_logical` for
    /// compressed and sparse files and through cluster rounding.
    pub size_physical: u64,
    pub attributes: u32,
    /// 100 ns intervals since the Unix epoch, UTC.
    pub last_change: i64,
    /// OS content-identity key (inode / NTFS file index); 0 if unavailable.
    pub file_index: u128,
    /// Owner identifier, only when the scan asked for it.
    pub owner: Option<String>,
}

/// Total and free bytes of the volume containing a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeStats {
    pub total: u64,
    pub free: u64,
}

impl VolumeStats {
    /// Bytes the OS reports as occupied — the scanner's progress estimate.
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

/// Filesystem failure modes, each recoverable at directory granularity.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("device not ready: {0}")]
    NotReady(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl FsError {
    /// Transient failures are retried by the scanner before being treated
    /// as access denied.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Io(_))
    }
}

/// Directory enumeration, metadata lookup and volume statistics.
///
/// Implementations must be shareable across scanner workers.
pub trait FsEnumerator: Send + Sync {
    /// Enumerate the direct entries of `path`. With `use_long_paths` the
    /// implementation uses its extended-length path form where the OS has
    /// one; elsewhere the flag is a no-op.
    fn read_dir(&self, path: &Path, use_long_paths: bool) -> Result<Vec<EntryRecord>, FsError>;

    /// Metadata for a single path (used by the change watcher).
    fn stat(&self, path: &Path) -> Result<EntryRecord, FsError>;

    /// Total/free bytes of the volume containing `path`.
    fn volume(&self, path: &Path) -> Result<VolumeStats, FsError>;

    /// `true` when `path` is itself a volume mount point. Scan roots at a
    /// mount point become drives and receive free/unknown synthesis;
    /// plain subdirectory roots do not.
    fn is_volume_root(&self, path: &Path) -> bool {
        let _ = path;
        false
    }
}

/// Convert a `SystemTime` to 100 ns intervals since the Unix epoch.
pub fn system_time_to_ticks(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64) * 10_000_000 + (d.subsec_nanos() as i64) / 100,
        Err(e) => {
            let d = e.duration();
            -((d.as_secs() as i64) * 10_000_000 + (d.subsec_nanos() as i64) / 100)
        }
    }
}

/// Convert tick timestamps back to a UTC datetime for display.
pub fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(10_000_000);
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}
