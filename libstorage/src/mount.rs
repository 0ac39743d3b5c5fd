//! Mount collaborator.
//!
//! [`Mounter`] is the seam between the connectors and the mount
//! syscalls, so tests can substitute an in-memory implementation.
//! [`SysMounter`] is the real one: `nix` mount/umount2 driven through
//! `spawn_blocking` under the uniform connection timeout, and mount
//! state probed from `/proc/self/mounts`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use tracing::debug;

use crate::error::StorageError;

/// Performs and probes filesystem mounts.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Whether `target` is currently listed as a mount point.
    async fn is_mounted(&self, target: &Path) -> bool;

    /// Mount `source` at `target` with the given option string and
    /// filesystem type.  A call that does not return within `timeout`
    /// fails; the in-flight syscall is not cancelled.
    async fn mount(
        &self,
        source: &str,
        target: &Path,
        options: &str,
        fs_type: &str,
        timeout: Duration,
    ) -> Result<(), StorageError>;

    /// Unmount `target`.  With `lazy` the mount point is detached
    /// immediately and the OS releases the filesystem once the last
    /// open handle closes, so a holder process cannot hang the call.
    async fn unmount(&self, target: &Path, lazy: bool, timeout: Duration)
    -> Result<(), StorageError>;

    /// Whether the mount at `target` holds a stale filesystem handle:
    /// the entry still appears mounted but the server-side resource is
    /// gone.
    async fn is_stale(&self, target: &Path) -> bool;
}

/// Return `true` if `target` appears as a mountpoint in the given
/// `/proc/self/mounts` contents.
///
/// Note: `/proc/self/mounts` uses octal escapes (`\040` for space,
/// etc.).  Derived mountpoint names never contain whitespace, so
/// direct string comparison is safe here.
///
/// Format: `<device> <mountpoint> <fstype> <options> <dump> <pass>`
fn proc_mounts_has(contents: &str, target: &Path) -> bool {
    let needle = target.to_string_lossy();
    contents
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(needle.as_ref()))
}

/// Syscall-backed [`Mounter`].
#[derive(Debug, Default, Clone)]
pub struct SysMounter;

impl SysMounter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mounter for SysMounter {
    async fn is_mounted(&self, target: &Path) -> bool {
        let contents = match tokio::fs::read_to_string("/proc/self/mounts").await {
            Ok(c) => c,
            Err(_) => return false,
        };
        proc_mounts_has(&contents, target)
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        options: &str,
        fs_type: &str,
        timeout: Duration,
    ) -> Result<(), StorageError> {
        let path = target.display().to_string();
        let fail = |reason: String| StorageError::MountFailed {
            path: path.clone(),
            reason,
        };

        let source = source.to_owned();
        let target = target.to_path_buf();
        let options = options.to_owned();
        let fs_type = fs_type.to_owned();
        let task = tokio::task::spawn_blocking(move || {
            nix::mount::mount(
                Some(source.as_str()),
                &target,
                Some(fs_type.as_str()),
                MsFlags::empty(),
                Some(options.as_str()),
            )
        });

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(fail(format!("timed out after {timeout:?}"))),
            Ok(Err(join)) => Err(fail(join.to_string())),
            Ok(Ok(Err(errno))) => Err(fail(errno.to_string())),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn unmount(
        &self,
        target: &Path,
        lazy: bool,
        timeout: Duration,
    ) -> Result<(), StorageError> {
        let path = target.display().to_string();
        let fail = |reason: String| StorageError::UnmountFailed {
            path: path.clone(),
            reason,
        };

        let flags = if lazy {
            MntFlags::MNT_DETACH
        } else {
            MntFlags::empty()
        };
        debug!(path = %path, lazy, "unmounting");

        let target = target.to_path_buf();
        let task = tokio::task::spawn_blocking(move || nix::mount::umount2(&target, flags));

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(fail(format!("timed out after {timeout:?}"))),
            Ok(Err(join)) => Err(fail(join.to_string())),
            Ok(Ok(Err(errno))) => Err(fail(errno.to_string())),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn is_stale(&self, target: &Path) -> bool {
        // A stat on the mountpoint surfaces ESTALE when the server-side
        // handle has been invalidated.  Any other outcome, including
        // plain absence, is not staleness.
        let target: PathBuf = target.to_path_buf();
        let result = tokio::task::spawn_blocking(move || std::fs::metadata(&target)).await;
        match result {
            Ok(Err(e)) => e.raw_os_error() == Some(Errno::ESTALE as i32),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
host:/export/data /var/lib/storage/mnt/host:_export_data nfs rw,soft 0 0
/dev/sda1 / ext4 rw,relatime 0 0
";

    #[test]
    fn proc_mounts_lookup() {
        assert!(proc_mounts_has(
            MOUNTS,
            Path::new("/var/lib/storage/mnt/host:_export_data")
        ));
        assert!(proc_mounts_has(MOUNTS, Path::new("/")));
        assert!(!proc_mounts_has(MOUNTS, Path::new("/var/lib/storage/mnt")));
    }

    #[test]
    fn proc_mounts_matches_whole_field_only() {
        // A prefix of a mounted path is not itself mounted.
        assert!(!proc_mounts_has(MOUNTS, Path::new("/var")));
        assert!(!proc_mounts_has(MOUNTS, Path::new("/sy")));
    }

    #[tokio::test]
    async fn missing_path_is_not_stale() {
        let mounter = SysMounter::new();
        assert!(!mounter.is_stale(Path::new("/nonexistent/for/test")).await);
    }
}
