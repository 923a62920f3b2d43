/// Platform helpers — local volume enumeration for whole-system scans.
use crate::model::size;
use std::path::PathBuf;
use sysinfo::Disks;

/// Information about a single mounted volume.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Mount point path, e.g. `/` or `/home`.
    pub mount_point: PathBuf,
    /// Device or volume label.
    pub name: String,
    /// Filesystem name (e.g. "ext4", "apfs", "NTFS").
    pub filesystem: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub is_removable: bool,
}

impl VolumeInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// One-line description for logs and listings.
    pub fn describe(&self) -> String {
        format!(
            "{} ({}) {} free of {}",
            self.mount_point.display(),
            self.filesystem,
            size::format_size(self.free_bytes),
            size::format_size(self.total_bytes),
        )
    }
}

/// Enumerate local mounted volumes, skipping pseudo-filesystems that
/// report zero capacity and duplicate mount points (bind mounts).
pub fn enumerate_local_volumes() -> Vec<VolumeInfo> {
    let disks = Disks::new_with_refreshed_list();
    let mut volumes: Vec<VolumeInfo> = Vec::new();
    for disk in disks.list() {
        if disk.total_space() == 0 {
            continue;
        }
        if volumes.iter().any(|v| v.mount_point == disk.mount_point()) {
            continue;
        }
        volumes.push(VolumeInfo {
            mount_point: disk.mount_point().to_path_buf(),
            name: disk.name().to_string_lossy().into_owned(),
            filesystem: disk.file_system().to_string_lossy().into_owned(),
            total_bytes: disk.total_space(),
            free_bytes: disk.available_space(),
            is_removable: disk.is_removable(),
        });
    }
    volumes.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    volumes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Enumeration must not panic and must never report free > total.
    #[test]
    fn volumes_are_consistent() {
        for vol in enumerate_local_volumes() {
            assert!(vol.total_bytes > 0);
            assert!(vol.free_bytes <= vol.total_bytes);
            assert!(!vol.describe().is_empty());
        }
    }
}
