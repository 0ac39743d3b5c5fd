//! Storage manager configuration.
//!
//! Configuration is passed explicitly into component constructors by
//! the caller's bootstrap; there is no ambient process-wide state.

use std::path::PathBuf;
use std::time::Duration;

/// Directory under the repository root where file and local
/// connections materialize their mountpoints and links.
const MNT_DIR: &str = "mnt";

/// Explicit configuration for the storage connection manager.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Repository root; mountpoints and links live under
    /// `<repository>/mnt`.
    pub repository: PathBuf,
    /// Uniform timeout applied to every mount and unmount call.  A
    /// call that does not return within this window is reported as a
    /// timeout failure, not retried.
    pub mount_timeout: Duration,
    /// Path of the persistent mount table.
    pub fstab_path: PathBuf,
    /// Directory of UUID-indexed device links, scanned to resolve a
    /// device path to its filesystem UUID.
    pub by_uuid_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("/var/lib/storage"),
            mount_timeout: Duration::from_secs(60),
            fstab_path: PathBuf::from("/etc/fstab"),
            by_uuid_dir: PathBuf::from("/dev/disk/by-uuid"),
        }
    }
}

impl StorageConfig {
    /// Root directory for all derived mountpoints and links.
    pub fn mount_root(&self) -> PathBuf {
        self.repository.join(MNT_DIR)
    }

    /// Configuration rooted at the given repository, with defaults for
    /// everything else.  Convenient for tests and embedded use.
    pub fn with_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_root_under_repository() {
        let config = StorageConfig::with_repository("/srv/storage");
        assert_eq!(config.mount_root(), PathBuf::from("/srv/storage/mnt"));
        assert_eq!(config.mount_timeout, Duration::from_secs(60));
    }
}
