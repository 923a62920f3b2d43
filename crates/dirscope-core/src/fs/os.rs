/// `std::fs`-backed enumerator — the production filesystem implementation.
///
/// Physical (allocated) sizes come from the `filesize` crate; volume
/// totals from `sysinfo`. On Unix the inode number doubles as the content
/// identity used for hardlink detection, symlinks surface as the
/// `Symlink` reparse kind, and a device-id change between a directory and
/// its parent surfaces as `MountPoint`. Junctions do not exist here and
/// are never produced.
use super::{attr, system_time_to_ticks, EntryRecord, FsEnumerator, FsError, ReparseKind, VolumeStats};
use filesize::PathExt;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use sysinfo::Disks;
use tracing::debug;

pub struct OsFs {
    compute_owner: bool,
}

impl OsFs {
    pub fn new(compute_owner: bool) -> Self {
        Self { compute_owner }
    }

    fn record_for(
        &self,
        path: &Path,
        name: String,
        meta: &Metadata,
        parent_dev: Option<u64>,
    ) -> EntryRecord {
        let is_symlink = meta.file_type().is_symlink();
        // Symlink targets decide directory-ness; the link itself is what
        // gets sized and attributed.
        let is_directory = if is_symlink {
            std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            meta.is_dir()
        };

        let size_logical = if meta.is_file() { meta.len() } else { 0 };
        let size_physical = if meta.is_file() {
            path.size_on_disk_fast(meta).unwrap_or(size_logical)
        } else {
            0
        };

        let reparse = if is_symlink {
            ReparseKind::Symlink
        } else if is_directory && device_changed(meta, parent_dev) {
            ReparseKind::MountPoint
        } else {
            ReparseKind::None
        };

        let mut attributes = 0;
        if meta.permissions().readonly() {
            attributes |= attr::READ_ONLY;
        }
        if name.starts_with('.') {
            attributes |= attr::HIDDEN;
        }
        if reparse != ReparseKind::None {
            attributes |= attr::REPARSE;
        }
        if size_physical < size_logical {
            attributes |= attr::SPARSE;
        }

        let last_change = meta
            .modified()
            .map(system_time_to_ticks)
            .unwrap_or_default();

        EntryRecord {
            name,
            is_directory,
            reparse,
            size_logical,
            size_physical,
            attributes,
            last_change,
            file_index: file_index_of(meta),
            owner: self.compute_owner.then(|| owner_of(meta)),
        }
    }
}

impl FsEnumerator for OsFs {
    fn read_dir(&self, path: &Path, _use_long_paths: bool) -> Result<Vec<EntryRecord>, FsError> {
        let parent_dev = device_of(
            &std::fs::symlink_metadata(path).map_err(|e| map_io_error(path, e))?,
        );
        let reader = std::fs::read_dir(path).map_err(|e| map_io_error(path, e))?;

        let mut records = Vec::new();
        for entry in reader {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("skipping unreadable entry in {}: {e}", path.display());
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_path = entry.path();
            match std::fs::symlink_metadata(&child_path) {
                Ok(meta) => records.push(self.record_for(&child_path, name, &meta, parent_dev)),
                Err(e) => debug!("stat failed for {}: {e}", child_path.display()),
            }
        }
        Ok(records)
    }

    fn stat(&self, path: &Path) -> Result<EntryRecord, FsError> {
        let meta = std::fs::symlink_metadata(path).map_err(|e| map_io_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let parent_dev = path
            .parent()
            .and_then(|p| std::fs::symlink_metadata(p).ok())
            .and_then(|m| device_of(&m));
        Ok(self.record_for(path, name, &meta, parent_dev))
    }

    fn volume(&self, path: &Path) -> Result<VolumeStats, FsError> {
        let disks = Disks::new_with_refreshed_list();
        // Longest mount-point prefix wins so /home on its own volume is
        // not attributed to /.
        let best = disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| FsError::NotFound(format!("no volume contains {}", path.display())))?;
        Ok(VolumeStats {
            total: best.total_space(),
            free: best.available_space(),
        })
    }

    fn is_volume_root(&self, path: &Path) -> bool {
        let disks = Disks::new_with_refreshed_list();
        disks.list().iter().any(|d| d.mount_point() == path)
    }
}

fn map_io_error(path: &Path, e: io::Error) -> FsError {
    let what = format!("{}: {e}", path.display());
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(what),
        io::ErrorKind::PermissionDenied => FsError::AccessDenied(what),
        _ => FsError::Io(what),
    }
}

#[cfg(unix)]
fn device_of(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.dev())
}

#[cfg(not(unix))]
fn device_of(_meta: &Metadata) -> Option<u64> {
    None
}

fn device_changed(meta: &Metadata, parent_dev: Option<u64>) -> bool {
    match (device_of(meta), parent_dev) {
        (Some(own), Some(parent)) => own != parent,
        _ => false,
    }
}

#[cfg(unix)]
fn file_index_of(meta: &Metadata) -> u128 {
    use std::os::unix::fs::MetadataExt;
    meta.ino() as u128
}

#[cfg(not(unix))]
fn file_index_of(_meta: &Metadata) -> u128 {
    0
}

#[cfg(unix)]
fn owner_of(meta: &Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("uid:{}", meta.uid())
}

#[cfg(not(unix))]
fn owner_of(_meta: &Metadata) -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn read_dir_reports_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let mut f = fs::File::create(tmp.path().join("data.bin")).unwrap();
        f.write_all(&[0u8; 2048]).unwrap();

        let osfs = OsFs::new(false);
        let mut entries = osfs.read_dir(tmp.path(), false).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "data.bin");
        assert!(!entries[0].is_directory);
        assert_eq!(entries[0].size_logical, 2048);
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].name, "sub");
    }

    #[test]
    fn missing_directory_is_not_found() {
        let osfs = OsFs::new(false);
        let err = osfs
            .read_dir(Path::new("/definitely/not/here"), false)
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn hardlinked_files_share_a_file_index() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.bin");
        fs::File::create(&a)
            .unwrap()
            .write_all(&[1u8; 512])
            .unwrap();
        fs::hard_link(&a, tmp.path().join("b.bin")).unwrap();

        let osfs = OsFs::new(false);
        let entries = osfs.read_dir(tmp.path(), false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].file_index, 0);
        assert_eq!(entries[0].file_index, entries[1].file_index);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_surface_as_reparse_entries() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("target")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("target"), tmp.path().join("link")).unwrap();

        let osfs = OsFs::new(false);
        let entries = osfs.read_dir(tmp.path(), false).unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert_eq!(link.reparse, ReparseKind::Symlink);
        assert!(link.is_directory);
        assert_ne!(link.attributes & attr::REPARSE, 0);
    }

    #[test]
    fn volume_of_tempdir_reports_nonzero_total() {
        let tmp = TempDir::new().unwrap();
        let osfs = OsFs::new(false);
        let vol = osfs.volume(tmp.path()).unwrap();
        assert!(vol.total > 0);
        assert!(vol.free <= vol.total);
    }
}
