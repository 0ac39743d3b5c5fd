//! Storage connection manager façade.
//!
//! [`StorageConnectionManager`] validates a whole batch of raw
//! connection maps up front, then routes it to the connector for its
//! domain kind.  The kind is inspected exactly once per call; the
//! connectors themselves never branch on it.
//!
//! Once validation has succeeded, a batch call cannot fail: every item
//! yields a status entry, in input order, no matter what goes wrong
//! while handling it.

use std::sync::Arc;

use tracing::info;

use crate::access::{AccessChecker, PosixAccessChecker};
use crate::block::BlockConnector;
use crate::config::StorageConfig;
use crate::connector::Connector;
use crate::error::StorageError;
use crate::file::FileServerConnector;
use crate::iscsi::{IscsiAdm, IscsiSession};
use crate::local::LocalConnector;
use crate::mount::{Mounter, SysMounter};
use crate::types::{ConnectionStatus, DomainKind, RawConnection};
use crate::validate::{self, Batch};

/// Public façade over the per-kind connectors.
pub struct StorageConnectionManager {
    file: FileServerConnector,
    local: LocalConnector,
    block: BlockConnector,
}

impl StorageConnectionManager {
    /// Build a manager with explicit collaborators.  Tests substitute
    /// mock implementations here.
    pub fn new(
        config: StorageConfig,
        mounter: Arc<dyn Mounter>,
        session: Arc<dyn IscsiSession>,
        access: Arc<dyn AccessChecker>,
    ) -> Self {
        Self {
            file: FileServerConnector::new(config.clone(), mounter, access.clone()),
            local: LocalConnector::new(config, access),
            block: BlockConnector::new(session),
        }
    }

    /// Build a manager wired to the real system collaborators: mount
    /// syscalls, `iscsiadm`, and in-process access checks.
    pub fn with_system_collaborators(config: StorageConfig) -> Self {
        Self::new(
            config,
            Arc::new(SysMounter::new()),
            Arc::new(IscsiAdm::new()),
            Arc::new(PosixAccessChecker::new()),
        )
    }

    /// Connect every item in the batch to its storage server.
    ///
    /// Returns one status per item, in input order, or an
    /// [`StorageError::InvalidParameter`] when the batch itself is
    /// malformed (in which case no item was processed).
    pub async fn connect(
        &self,
        kind: DomainKind,
        batch: &[RawConnection],
    ) -> Result<Vec<ConnectionStatus>, StorageError> {
        info!(%kind, items = batch.len(), "request to connect storage server");
        match validate::parse_batch(kind, batch)? {
            Batch::File(conns) => Ok(self.file.connect(&conns).await),
            Batch::Local(conns) => Ok(self.local.connect(&conns).await),
            Batch::Block(conns) => Ok(self.block.connect(&conns).await),
        }
    }

    /// Disconnect every item in the batch from its storage server.
    pub async fn disconnect(
        &self,
        kind: DomainKind,
        batch: &[RawConnection],
    ) -> Result<Vec<ConnectionStatus>, StorageError> {
        info!(%kind, items = batch.len(), "request to disconnect storage server");
        match validate::parse_batch(kind, batch)? {
            Batch::File(conns) => Ok(self.file.disconnect(&conns).await),
            Batch::Local(conns) => Ok(self.local.disconnect(&conns).await),
            Batch::Block(conns) => Ok(self.block.disconnect(&conns).await),
        }
    }

    /// Check that every item in the batch could be connected, without
    /// leaving persistent state behind.
    pub async fn validate(
        &self,
        kind: DomainKind,
        batch: &[RawConnection],
    ) -> Result<Vec<ConnectionStatus>, StorageError> {
        info!(%kind, items = batch.len(), "request to validate storage server");
        match validate::parse_batch(kind, batch)? {
            Batch::File(conns) => Ok(self.file.validate(&conns).await),
            Batch::Local(conns) => Ok(self.local.validate(&conns).await),
            Batch::Block(conns) => Ok(self.block.validate(&conns).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mounter that accepts everything and counts its mount calls.
    #[derive(Default)]
    struct CountingMounter {
        mounts: Mutex<usize>,
    }

    #[async_trait]
    impl Mounter for CountingMounter {
        async fn is_mounted(&self, _target: &Path) -> bool {
            false
        }

        async fn mount(
            &self,
            _source: &str,
            _target: &Path,
            _options: &str,
            _fs_type: &str,
            _timeout: Duration,
        ) -> Result<(), StorageError> {
            *self.mounts.lock().unwrap() += 1;
            Ok(())
        }

        async fn unmount(
            &self,
            _target: &Path,
            _lazy: bool,
            _timeout: Duration,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn is_stale(&self, _target: &Path) -> bool {
            false
        }
    }

    /// Session collaborator that must never be reached in these tests.
    struct UnreachableSession;

    #[async_trait]
    impl IscsiSession for UnreachableSession {
        async fn add_portal(
            &self,
            _address: &str,
            _port: &str,
            _initiator_name: Option<&str>,
            _user: &str,
            _password: &str,
        ) -> Result<(), StorageError> {
            panic!("session collaborator must not be reached");
        }

        async fn add_node(
            &self,
            _address: &str,
            _port: &str,
            _iqn: &str,
            _tpgt: &str,
            _initiator_name: Option<&str>,
            _user: &str,
            _password: &str,
        ) -> Result<(), StorageError> {
            panic!("session collaborator must not be reached");
        }

        async fn remove_portal(&self, _address: &str, _port: &str) -> Result<(), StorageError> {
            panic!("session collaborator must not be reached");
        }

        async fn remove_node(
            &self,
            _address: &str,
            _port: &str,
            _iqn: &str,
            _tpgt: &str,
        ) -> Result<(), StorageError> {
            panic!("session collaborator must not be reached");
        }
    }

    struct AllowAllAccess;

    #[async_trait]
    impl AccessChecker for AllowAllAccess {
        async fn validate_access(&self, _path: &Path) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn raw(fields: &[(&str, &str)]) -> RawConnection {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
    }

    fn make_manager(repo: &Path, mounter: Arc<CountingMounter>) -> StorageConnectionManager {
        StorageConnectionManager::new(
            StorageConfig::with_repository(repo),
            mounter,
            Arc::new(UnreachableSession),
            Arc::new(AllowAllAccess),
        )
    }

    #[tokio::test]
    async fn output_matches_input_length_and_order() {
        let repo = tempfile::tempdir().unwrap();
        let manager = make_manager(repo.path(), Arc::new(CountingMounter::default()));
        let batch = vec![
            raw(&[("id", "x"), ("connection", "h:/a")]),
            raw(&[("id", "y"), ("connection", "h:/b")]),
            raw(&[("id", "z"), ("connection", "h:/c")]),
        ];

        for statuses in [
            manager.connect(DomainKind::Nfs, &batch).await.unwrap(),
            manager.disconnect(DomainKind::Nfs, &batch).await.unwrap(),
            manager.validate(DomainKind::Nfs, &batch).await.unwrap(),
        ] {
            assert_eq!(statuses.len(), batch.len());
            for (status, con) in statuses.iter().zip(&batch) {
                assert_eq!(&status.id, con.get("id").unwrap());
            }
        }
    }

    #[tokio::test]
    async fn malformed_batch_aborts_before_any_item_is_processed() {
        let repo = tempfile::tempdir().unwrap();
        let mounter = Arc::new(CountingMounter::default());
        let manager = make_manager(repo.path(), mounter.clone());
        let batch = vec![
            raw(&[("id", "good"), ("connection", "h:/a")]),
            raw(&[("id", "bad")]),
        ];

        let err = manager.connect(DomainKind::Nfs, &batch).await.unwrap_err();

        assert!(matches!(err, StorageError::InvalidParameter { .. }));
        // Batch validation happens before any connection work starts.
        assert_eq!(*mounter.mounts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn local_kind_routes_to_the_local_connector() {
        let repo = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let mounter = Arc::new(CountingMounter::default());
        let manager = make_manager(repo.path(), mounter.clone());
        let src = source.path().to_string_lossy().into_owned();
        let batch = vec![raw(&[("id", "1"), ("connection", src.as_str())])];

        let statuses = manager.connect(DomainKind::Local, &batch).await.unwrap();

        assert_eq!(statuses[0].status, StatusCode::Ok);
        // Local connections never go through the mounter.
        assert_eq!(*mounter.mounts.lock().unwrap(), 0);
    }
}
