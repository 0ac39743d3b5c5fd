//! File server connector (NFS-style).
//!
//! Each remote export maps to a deterministic mountpoint under the
//! repository mount root.  Connect recovers stale mounts, mounts the
//! export if absent, and verifies access, rolling the mount back when
//! access is refused.  Validate probes through a scratch mountpoint
//! that is always cleaned up, never touching the canonical mount tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use crate::access::AccessChecker;
use crate::config::StorageConfig;
use crate::connector::Connector;
use crate::error::StorageError;
use crate::mount::Mounter;
use crate::paths::transform_path;
use crate::types::{ConnectionStatus, FileConnection, StatusCode};

/// Default NFS mount options.
pub const NFS_OPTIONS: &str = "soft,nosharecache,timeo=600,retrans=6";
/// Filesystem type passed to the mounter.
pub const VFS_NFS: &str = "nfs";

/// Connector for network file server exports.
pub struct FileServerConnector {
    config: StorageConfig,
    mounter: Arc<dyn Mounter>,
    access: Arc<dyn AccessChecker>,
}

impl FileServerConnector {
    pub fn new(
        config: StorageConfig,
        mounter: Arc<dyn Mounter>,
        access: Arc<dyn AccessChecker>,
    ) -> Self {
        Self {
            config,
            mounter,
            access,
        }
    }

    /// Canonical mountpoint for a remote export.  The same remote path
    /// always maps to the same local path.
    fn mount_path(&self, remote_path: &str) -> PathBuf {
        self.config.mount_root().join(transform_path(remote_path))
    }

    async fn connect_one(&self, con: &FileConnection) -> Result<(), StorageError> {
        let target = self.mount_path(&con.remote_path);
        let timeout = self.config.mount_timeout;

        // Stale handles usually resolve themselves on directory lookup,
        // but if the export was deleted server-side they persist until
        // the filesystem is remounted.  A process may hold the stale
        // handle open indefinitely, so detach lazily rather than block
        // on the unmount; holders recover when they reopen their files.
        if self.mounter.is_stale(&target).await {
            warn!(path = %target.display(), "stale mount handle, detaching lazily");
            self.mounter.unmount(&target, true, timeout).await?;
        }

        tokio::fs::create_dir_all(&target).await?;

        if !self.mounter.is_mounted(&target).await {
            self.mounter
                .mount(&con.remote_path, &target, NFS_OPTIONS, VFS_NFS, timeout)
                .await?;
        }

        if let Err(denied) = self.access.validate_access(&target).await {
            // Connecting to an inaccessible share is equivalent to not
            // connecting at all: roll back the mount and surface the
            // access failure.
            debug!(remote_path = %con.remote_path, "unmounting, not enough access permissions");
            if let Err(e) = self.mounter.unmount(&target, false, timeout).await {
                warn!(path = %target.display(), error = %e, "rollback unmount failed");
            }
            return Err(denied);
        }
        Ok(())
    }

    async fn disconnect_one(&self, con: &FileConnection) -> Result<(), StorageError> {
        let target = self.mount_path(&con.remote_path);

        if self.mounter.is_mounted(&target).await {
            self.mounter
                .unmount(&target, false, self.config.mount_timeout)
                .await?;
        }

        // The disconnect itself succeeded; a leftover empty mountpoint
        // directory is logged, not reported.
        if let Err(e) = tokio::fs::remove_dir(&target).await {
            warn!(path = %target.display(), error = %e, "cannot remove mountpoint after unmount");
        }
        Ok(())
    }

    async fn validate_one(&self, con: &FileConnection) -> Result<(), StorageError> {
        // Probe through a scratch mountpoint so validation never
        // touches the canonical mount tree.  Scratch removal is managed
        // by hand: `TempDir`'s drop removes recursively, which must
        // never run while a mount could still be live at the path.
        let scratch = tempfile::tempdir().map_err(StorageError::io)?;
        let target = scratch.keep();

        let result = self.probe_mount(&con.remote_path, &target).await;

        // Cleanup runs on every exit path.  If the unmount fails, the
        // scratch directory is leaked rather than removed: anything
        // reachable through the still-mounted filesystem is remote
        // data, not scratch state.
        if self.mounter.is_mounted(&target).await {
            if let Err(e) = self
                .mounter
                .unmount(&target, false, self.config.mount_timeout)
                .await
            {
                warn!(path = %target.display(), error = %e,
                    "error cleaning scratch mount, leaving scratch directory in place");
                return result;
            }
        }

        // Non-recursive on purpose: fails safely if anything is still
        // visible at the path.
        if let Err(e) = tokio::fs::remove_dir(&target).await {
            warn!(path = %target.display(), error = %e, "cannot remove scratch mountpoint");
        }
        result
    }

    async fn probe_mount(&self, source: &str, target: &Path) -> Result<(), StorageError> {
        self.mounter
            .mount(
                source,
                target,
                NFS_OPTIONS,
                VFS_NFS,
                self.config.mount_timeout,
            )
            .await?;
        self.access.validate_access(target).await
    }
}

#[async_trait]
impl Connector for FileServerConnector {
    type Conn = FileConnection;

    #[instrument(skip_all, fields(items = batch.len()))]
    async fn connect(&self, batch: &[FileConnection]) -> Vec<ConnectionStatus> {
        // Pre-create the shared mount root; per-item directory creation
        // below covers it again, so a failure here only gets logged.
        if let Err(e) = tokio::fs::create_dir_all(self.config.mount_root()).await {
            warn!(error = %e, "cannot pre-create mount root");
        }

        let mut statuses = Vec::with_capacity(batch.len());
        for con in batch {
            let status = match self.connect_one(con).await {
                Ok(()) => StatusCode::Ok,
                Err(e) => {
                    error!(id = %con.id, error = %e, "error during storage connection");
                    e.status().unwrap_or(StatusCode::ConnectionError)
                }
            };
            statuses.push(ConnectionStatus::new(&con.id, status));
        }
        statuses
    }

    #[instrument(skip_all, fields(items = batch.len()))]
    async fn disconnect(&self, batch: &[FileConnection]) -> Vec<ConnectionStatus> {
        let mut statuses = Vec::with_capacity(batch.len());
        for con in batch {
            let status = match self.disconnect_one(con).await {
                Ok(()) => StatusCode::Ok,
                Err(e) => {
                    error!(id = %con.id, error = %e, "error during storage disconnection");
                    e.status().unwrap_or(StatusCode::DisconnectionError)
                }
            };
            statuses.push(ConnectionStatus::new(&con.id, status));
        }
        statuses
    }

    #[instrument(skip_all, fields(items = batch.len()))]
    async fn validate(&self, batch: &[FileConnection]) -> Vec<ConnectionStatus> {
        let mut statuses = Vec::with_capacity(batch.len());
        for con in batch {
            let status = match self.validate_one(con).await {
                Ok(()) => StatusCode::Ok,
                Err(e) => {
                    error!(id = %con.id, error = %e, "error during storage connection validation");
                    e.status().unwrap_or(StatusCode::ValidationError)
                }
            };
            statuses.push(ConnectionStatus::new(&con.id, status));
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockMounter {
        mounted: Mutex<HashSet<PathBuf>>,
        stale: Mutex<HashSet<PathBuf>>,
        fail_sources: HashSet<String>,
        fail_unmount: bool,
        /// Drop a marker file into the target on mount, standing in
        /// for remote content visible through the mountpoint.
        marker_on_mount: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockMounter {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mounted_at(&self, target: &Path) -> bool {
            self.mounted.lock().unwrap().contains(target)
        }
    }

    #[async_trait]
    impl Mounter for MockMounter {
        async fn is_mounted(&self, target: &Path) -> bool {
            self.mounted_at(target)
        }

        async fn mount(
            &self,
            source: &str,
            target: &Path,
            _options: &str,
            _fs_type: &str,
            _timeout: std::time::Duration,
        ) -> Result<(), StorageError> {
            self.calls.lock().unwrap().push(format!("mount {source}"));
            if self.fail_sources.contains(source) {
                return Err(StorageError::MountFailed {
                    path: target.display().to_string(),
                    reason: "no route to host".into(),
                });
            }
            if self.marker_on_mount {
                std::fs::write(target.join("exported.txt"), b"remote data").unwrap();
            }
            self.mounted.lock().unwrap().insert(target.to_path_buf());
            Ok(())
        }

        async fn unmount(
            &self,
            target: &Path,
            lazy: bool,
            _timeout: std::time::Duration,
        ) -> Result<(), StorageError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("unmount lazy={lazy}"));
            if self.fail_unmount {
                return Err(StorageError::UnmountFailed {
                    path: target.display().to_string(),
                    reason: "target is busy".into(),
                });
            }
            self.mounted.lock().unwrap().remove(target);
            self.stale.lock().unwrap().remove(target);
            Ok(())
        }

        async fn is_stale(&self, target: &Path) -> bool {
            self.stale.lock().unwrap().contains(target)
        }
    }

    #[derive(Default)]
    struct MockAccess {
        deny_all: bool,
    }

    #[async_trait]
    impl AccessChecker for MockAccess {
        async fn validate_access(&self, path: &Path) -> Result<(), StorageError> {
            if self.deny_all {
                Err(StorageError::PermissionDenied {
                    path: path.display().to_string(),
                    reason: "denied by test".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn connection(id: &str, remote_path: &str) -> FileConnection {
        FileConnection {
            id: id.to_owned(),
            remote_path: remote_path.to_owned(),
        }
    }

    struct Fixture {
        _repo: tempfile::TempDir,
        config: StorageConfig,
        mounter: Arc<MockMounter>,
    }

    impl Fixture {
        fn new(mounter: MockMounter, access: MockAccess) -> (Self, FileServerConnector) {
            let repo = tempfile::tempdir().unwrap();
            let config = StorageConfig::with_repository(repo.path());
            let mounter = Arc::new(mounter);
            let connector = FileServerConnector::new(
                config.clone(),
                mounter.clone(),
                Arc::new(access),
            );
            (
                Self {
                    _repo: repo,
                    config,
                    mounter,
                },
                connector,
            )
        }

        fn target(&self, remote_path: &str) -> PathBuf {
            self.config.mount_root().join(transform_path(remote_path))
        }
    }

    #[tokio::test]
    async fn connect_mounts_and_reports_ok() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());
        let batch = vec![connection("1", "host:/exp1"), connection("2", "host:/exp2")];

        let statuses = connector.connect(&batch).await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], ConnectionStatus::ok("1"));
        assert_eq!(statuses[1], ConnectionStatus::ok("2"));
        assert!(fx.mounter.mounted_at(&fx.target("host:/exp1")));
        assert!(fx.target("host:/exp2").is_dir());
    }

    #[tokio::test]
    async fn connect_is_idempotent_when_already_mounted() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());
        fx.mounter
            .mounted
            .lock()
            .unwrap()
            .insert(fx.target("host:/exp1"));

        let statuses = connector.connect(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);
        assert!(fx.mounter.calls().iter().all(|c| !c.starts_with("mount")));
    }

    #[tokio::test]
    async fn mount_failure_is_isolated_to_one_item() {
        let mounter = MockMounter {
            fail_sources: HashSet::from(["host:/doesnotexist".to_owned()]),
            ..Default::default()
        };
        let (_fx, connector) = Fixture::new(mounter, MockAccess::default());
        let batch = vec![
            connection("1", "host:/exp1"),
            connection("2", "host:/doesnotexist"),
            connection("3", "host:/exp3"),
        ];

        let statuses = connector.connect(&batch).await;

        assert_eq!(statuses[0].status, StatusCode::Ok);
        assert_eq!(statuses[1].status, StatusCode::MountError);
        assert_eq!(statuses[2].status, StatusCode::Ok);
        assert_eq!(statuses[1].id, "2");
    }

    #[tokio::test]
    async fn stale_mount_is_lazily_detached_and_remounted() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());
        let target = fx.target("host:/exp1");
        fx.mounter.mounted.lock().unwrap().insert(target.clone());
        fx.mounter.stale.lock().unwrap().insert(target.clone());

        let statuses = connector.connect(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);
        let calls = fx.mounter.calls();
        assert_eq!(calls[0], "unmount lazy=true");
        assert_eq!(calls[1], "mount host:/exp1");
        assert!(fx.mounter.mounted_at(&target));
    }

    #[tokio::test]
    async fn permission_denied_rolls_back_the_mount() {
        let (fx, connector) =
            Fixture::new(MockMounter::default(), MockAccess { deny_all: true });

        let statuses = connector.connect(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses[0].status, StatusCode::PermissionError);
        // The freshly created mount must have been rolled back.
        assert!(!fx.mounter.mounted_at(&fx.target("host:/exp1")));
        assert!(fx.mounter.calls().contains(&"unmount lazy=false".to_owned()));
    }

    #[tokio::test]
    async fn disconnect_unmounts_and_removes_mountpoint() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());
        let target = fx.target("host:/exp1");
        tokio::fs::create_dir_all(&target).await.unwrap();
        fx.mounter.mounted.lock().unwrap().insert(target.clone());

        let statuses = connector.disconnect(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);
        assert!(!fx.mounter.mounted_at(&target));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn disconnect_when_not_mounted_is_ok() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());

        let statuses = connector.disconnect(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);
        assert!(fx.mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn validate_cleans_up_scratch_mount_on_denied_access() {
        let (fx, connector) =
            Fixture::new(MockMounter::default(), MockAccess { deny_all: true });

        let statuses = connector.validate(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses[0].status, StatusCode::PermissionError);
        // Whatever the probe mounted must have been unmounted again.
        assert!(fx.mounter.mounted.lock().unwrap().is_empty());
        assert!(fx.mounter.calls().contains(&"unmount lazy=false".to_owned()));
    }

    #[tokio::test]
    async fn validate_keeps_mounted_content_when_scratch_unmount_fails() {
        let mounter = MockMounter {
            fail_unmount: true,
            marker_on_mount: true,
            ..Default::default()
        };
        let (fx, connector) = Fixture::new(mounter, MockAccess::default());

        let statuses = connector.validate(&[connection("1", "host:/exp1")]).await;

        // The probe itself succeeded; the cleanup failure is logged only.
        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);

        // The scratch directory is leaked, never removed through the
        // still-live mount: everything visible at the mountpoint is
        // remote data and must survive.
        let mounted: Vec<PathBuf> = fx.mounter.mounted.lock().unwrap().iter().cloned().collect();
        assert_eq!(mounted.len(), 1);
        let target = &mounted[0];
        assert!(target.is_dir());
        assert!(target.join("exported.txt").is_file());

        // Leave no stray scratch directory behind after the test.
        let _ = std::fs::remove_dir_all(target);
    }

    #[tokio::test]
    async fn validate_success_leaves_no_mounts_behind() {
        let (fx, connector) = Fixture::new(MockMounter::default(), MockAccess::default());

        let statuses = connector.validate(&[connection("1", "host:/exp1")]).await;

        assert_eq!(statuses, vec![ConnectionStatus::ok("1")]);
        assert!(fx.mounter.mounted.lock().unwrap().is_empty());
        // The canonical mountpoint is untouched by validate.
        assert!(!fx.target("host:/exp1").exists());
    }
}
