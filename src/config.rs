//! Layered configuration: an optional JSON file overlaid by CLI flags.
//!
//! The file mirrors the scan flags one-to-one, so anything that can be
//! passed on the command line can also be made sticky. Lookup order is
//! `./dirscope.json`, then `~/.config/dirscope.json`; flags always win.

use dirscope_core::scanner::ScanOptions;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub threads: Option<usize>,
    pub follow_junctions: Option<bool>,
    pub follow_mount_points: Option<bool>,
    pub follow_symlinks: Option<bool>,
    pub compute_owner: Option<bool>,
    pub dupes: Option<bool>,
    pub use_long_paths: Option<bool>,
    pub use_logical: Option<bool>,
    pub top: Option<usize>,
}

impl ConfigFile {
    /// Load the first config file found, or defaults when there is none.
    pub fn load() -> Self {
        for path in candidate_paths() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(config) => {
                        debug!("loaded config from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("ignoring malformed {}: {e}", path.display());
                    }
                },
                Err(_) => continue,
            }
        }
        Self::default()
    }

    pub fn from_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("dirscope.json")];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config").join("dirscope.json"));
    }
    paths
}

/// CLI flags shared by every command; `None`/`false` means "not given",
/// letting the config file fill the gap.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ScanFlags {
    /// Scanner pool size (default: CPU count)
    #[arg(long, global = true, value_name = "N")]
    pub threads: Option<usize>,

    /// Descend into junction reparse points
    #[arg(long, global = true)]
    pub follow_junctions: bool,

    /// Descend into mount points
    #[arg(long, global = true)]
    pub follow_mount_points: bool,

    /// Descend into symbolic links
    #[arg(long, global = true)]
    pub follow_symlinks: bool,

    /// Resolve the owner of every entry
    #[arg(long, global = true)]
    pub compute_owner: bool,

    /// Detect duplicate files by content fingerprint
    #[arg(long, global = true)]
    pub dupes: bool,

    /// Use long-path forms for OS calls
    #[arg(long, global = true)]
    pub use_long_paths: bool,

    /// Size treemap rectangles by logical instead of physical bytes
    #[arg(long, global = true)]
    pub use_logical: bool,

    /// Track the N largest files
    #[arg(long, global = true, value_name = "N")]
    pub top: Option<usize>,
}

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub options: ScanOptions,
    pub use_logical: bool,
}

pub fn merge(config: &ConfigFile, flags: &ScanFlags) -> Settings {
    let defaults = ScanOptions::default();
    let dupes = flags.dupes || config.dupes.unwrap_or(false);
    let options = ScanOptions {
        threads: flags
            .threads
            .or(config.threads)
            .unwrap_or(defaults.threads)
            .max(1),
        follow_junctions: flags.follow_junctions || config.follow_junctions.unwrap_or(false),
        follow_mount_points: flags.follow_mount_points
            || config.follow_mount_points.unwrap_or(false),
        follow_symlinks: flags.follow_symlinks || config.follow_symlinks.unwrap_or(false),
        compute_owner: flags.compute_owner || config.compute_owner.unwrap_or(false),
        scan_for_duplicates: dupes,
        use_long_paths: flags.use_long_paths || config.use_long_paths.unwrap_or(false),
        top_files: flags.top.or(config.top).unwrap_or(0),
    };
    Settings {
        options,
        use_logical: flags.use_logical || config.use_logical.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let config = ConfigFile::from_str(r#"{"threads": 2, "top": 10}"#).unwrap();
        let flags = ScanFlags {
            threads: Some(8),
            ..ScanFlags::default()
        };
        let settings = merge(&config, &flags);
        assert_eq!(settings.options.threads, 8);
        assert_eq!(settings.options.top_files, 10, "config fills the gap");
    }

    #[test]
    fn booleans_combine_with_or() {
        let config = ConfigFile::from_str(r#"{"follow_symlinks": true}"#).unwrap();
        let flags = ScanFlags {
            dupes: true,
            ..ScanFlags::default()
        };
        let settings = merge(&config, &flags);
        assert!(settings.options.follow_symlinks);
        assert!(settings.options.scan_for_duplicates);
        assert!(!settings.options.follow_junctions);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ConfigFile::from_str(r#"{"no_such_key": 1}"#).is_err());
    }
}
