/// Deterministic in-memory filesystem used by the test-suite.
///
/// Lets tests pin down exactly the situations a real disk makes flaky:
/// fixed volume totals, explicit file indexes for hardlink groups,
/// reparse kinds that do not exist on the host OS, and injected
/// enumeration failures (including transient ones that succeed after N
/// attempts, for the retry path).
///
/// All mutation goes through a mutex so a test can alter the filesystem
/// while a scan or watcher is running against it.
use super::{attr, EntryRecord, FsEnumerator, FsError, ReparseKind, VolumeStats};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Default)]
struct Inner {
    /// Directory path → entries by name.
    dirs: HashMap<PathBuf, BTreeMap<String, EntryRecord>>,
    /// Injected read_dir failures; a countdown of None means permanent.
    failures: HashMap<PathBuf, (FailureKind, Option<u32>)>,
    /// Volume mount points with fixed totals.
    volumes: Vec<(PathBuf, VolumeStats)>,
}

#[derive(Clone, Copy)]
enum FailureKind {
    AccessDenied,
    NotReady,
}

#[derive(Default)]
pub struct MemoryFs {
    inner: Mutex<Inner>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a volume rooted at `path` with the given totals. Scan roots
    /// equal to a volume path are treated as drives.
    pub fn set_volume(&self, path: impl Into<PathBuf>, total: u64, free: u64) {
        let path = path.into();
        self.ensure_dir_chain(&path);
        self.inner
            .lock()
            .volumes
            .push((path, VolumeStats { total, free }));
    }

    /// Register an (empty) directory, creating missing ancestors.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.ensure_dir_chain(&path.into());
    }

    /// Register a directory that is a reparse point of the given kind.
    pub fn add_reparse_dir(&self, path: impl Into<PathBuf>, kind: ReparseKind) {
        let path = path.into();
        self.ensure_dir_chain(&path);
        if let Some(parent) = path.parent() {
            let name = file_name(&path);
            let mut inner = self.inner.lock();
            if let Some(entry) = inner
                .dirs
                .get_mut(parent)
                .and_then(|m| m.get_mut(&name))
            {
                entry.reparse = kind;
                entry.attributes |= attr::REPARSE;
            }
        }
    }

    /// Add a file with equal logical and physical size.
    pub fn add_file(&self, path: impl Into<PathBuf>, size: u64) {
        self.add_record(path.into(), |r| {
            r.size_logical = size;
            r.size_physical = size;
        });
    }

    /// Add a file with distinct logical/physical sizes (compressed or
    /// sparse).
    pub fn add_file_sized(&self, path: impl Into<PathBuf>, logical: u64, physical: u64) {
        self.add_record(path.into(), |r| {
            r.size_logical = logical;
            r.size_physical = physical;
            if physical < logical {
                r.attributes |= attr::SPARSE;
            }
        });
    }

    /// Add a file that participates in a hardlink group: all files added
    /// with the same non-zero `file_index` share content identity.
    pub fn add_hardlink(&self, path: impl Into<PathBuf>, size: u64, file_index: u128) {
        self.add_record(path.into(), |r| {
            r.size_logical = size;
            r.size_physical = size;
            r.file_index = file_index;
        });
    }

    /// Set the change timestamp (ticks) of an existing entry.
    pub fn set_last_change(&self, path: impl AsRef<Path>, ticks: i64) {
        self.with_record(path.as_ref(), |r| r.last_change = ticks);
    }

    /// Set the attribute bits of an existing entry.
    pub fn set_attributes(&self, path: impl AsRef<Path>, bits: u32) {
        self.with_record(path.as_ref(), |r| r.attributes = bits);
    }

    /// Set the owner of an existing entry.
    pub fn set_owner(&self, path: impl AsRef<Path>, owner: &str) {
        self.with_record(path.as_ref(), |r| r.owner = Some(owner.to_owned()));
    }

    /// Change an existing file's size in place (watcher Modified tests).
    pub fn update_file(&self, path: impl AsRef<Path>, size: u64) {
        self.with_record(path.as_ref(), |r| {
            r.size_logical = size;
            r.size_physical = size;
        });
    }

    /// Remove an entry (and its subtree, for directories).
    pub fn remove_entry(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        if let (Some(parent), name) = (path.parent(), file_name(path)) {
            if let Some(listing) = inner.dirs.get_mut(parent) {
                listing.remove(&name);
            }
        }
        inner.dirs.retain(|dir, _| !dir.starts_with(path));
    }

    /// Make `read_dir` fail with AccessDenied permanently.
    pub fn deny_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.ensure_dir_chain(&path);
        self.inner
            .lock()
            .failures
            .insert(path, (FailureKind::AccessDenied, None));
    }

    /// Make `read_dir` fail with a transient error `times` times, then
    /// succeed.
    pub fn fail_dir_transient(&self, path: impl Into<PathBuf>, times: u32) {
        let path = path.into();
        self.ensure_dir_chain(&path);
        self.inner
            .lock()
            .failures
            .insert(path, (FailureKind::NotReady, Some(times)));
    }

    fn add_record(&self, path: PathBuf, fill: impl FnOnce(&mut EntryRecord)) {
        let parent = path
            .parent()
            .expect("MemoryFs entries need a parent directory")
            .to_path_buf();
        self.ensure_dir_chain(&parent);
        let name = file_name(&path);
        let mut record = blank_record(name.clone(), false);
        fill(&mut record);
        self.inner
            .lock()
            .dirs
            .entry(parent)
            .or_default()
            .insert(name, record);
    }

    fn with_record(&self, path: &Path, edit: impl FnOnce(&mut EntryRecord)) {
        let mut inner = self.inner.lock();
        if let (Some(parent), name) = (path.parent(), file_name(path)) {
            if let Some(record) = inner.dirs.get_mut(parent).and_then(|m| m.get_mut(&name)) {
                edit(record);
            }
        }
    }

    fn ensure_dir_chain(&self, path: &Path) {
        let mut inner = self.inner.lock();
        let mut cursor = Some(path);
        while let Some(dir) = cursor {
            inner.dirs.entry(dir.to_path_buf()).or_default();
            if let Some(parent) = dir.parent() {
                // List the directory inside its parent if the parent is
                // itself a known directory level (roots are not listed).
                let name = file_name(dir);
                if !name.is_empty() {
                    inner
                        .dirs
                        .entry(parent.to_path_buf())
                        .or_default()
                        .entry(name)
                        .or_insert_with(|| blank_record(file_name(dir), true));
                }
            }
            cursor = dir.parent();
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn blank_record(name: String, is_directory: bool) -> EntryRecord {
    EntryRecord {
        name,
        is_directory,
        reparse: ReparseKind::None,
        size_logical: 0,
        size_physical: 0,
        attributes: 0,
        last_change: 0,
        file_index: 0,
        owner: None,
    }
}

impl FsEnumerator for MemoryFs {
    fn read_dir(&self, path: &Path, _use_long_paths: bool) -> Result<Vec<EntryRecord>, FsError> {
        let mut inner = self.inner.lock();
        if let Some((kind, countdown)) = inner.failures.get_mut(path) {
            let fire = match countdown {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            };
            if fire {
                return Err(match kind {
                    FailureKind::AccessDenied => {
                        FsError::AccessDenied(path.display().to_string())
                    }
                    FailureKind::NotReady => FsError::NotReady(path.display().to_string()),
                });
            }
        }
        inner
            .dirs
            .get(path)
            .map(|listing| listing.values().cloned().collect())
            .ok_or_else(|| FsError::NotFound(path.display().to_string()))
    }

    fn stat(&self, path: &Path) -> Result<EntryRecord, FsError> {
        let inner = self.inner.lock();
        if let (Some(parent), name) = (path.parent(), file_name(path)) {
            if let Some(record) = inner.dirs.get(parent).and_then(|m| m.get(&name)) {
                return Ok(record.clone());
            }
        }
        if inner.dirs.contains_key(path) {
            return Ok(blank_record(file_name(path), true));
        }
        Err(FsError::NotFound(path.display().to_string()))
    }

    fn volume(&self, path: &Path) -> Result<VolumeStats, FsError> {
        let inner = self.inner.lock();
        inner
            .volumes
            .iter()
            .filter(|(mount, _)| path.starts_with(mount))
            .max_by_key(|(mount, _)| mount.as_os_str().len())
            .map(|&(_, stats)| stats)
            .ok_or_else(|| FsError::NotFound(format!("no volume contains {}", path.display())))
    }

    fn is_volume_root(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .volumes
            .iter()
            .any(|(mount, _)| mount == path)
    }
}
