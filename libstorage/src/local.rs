//! Local-directory connector.
//!
//! A local source directory is "connected" by placing a symbolic link
//! to it under the repository mount root, using the same deterministic
//! name derivation as the file connector.  No mounts are involved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, instrument, warn};

use crate::access::AccessChecker;
use crate::config::StorageConfig;
use crate::connector::Connector;
use crate::error::StorageError;
use crate::paths::transform_path;
use crate::types::{ConnectionStatus, LocalConnection, StatusCode};

/// Connector for local directories.
pub struct LocalConnector {
    config: StorageConfig,
    access: Arc<dyn AccessChecker>,
}

impl LocalConnector {
    pub fn new(config: StorageConfig, access: Arc<dyn AccessChecker>) -> Self {
        Self { config, access }
    }

    /// Link location for a source path, derived the same way as file
    /// mountpoints.
    fn link_path(&self, path: &str) -> PathBuf {
        self.config.mount_root().join(transform_path(path))
    }

    /// `true` when something (including a dangling symlink) exists at
    /// the link location.
    async fn link_exists(&self, link: &Path) -> bool {
        tokio::fs::symlink_metadata(link).await.is_ok()
    }

    async fn connect_one(&self, con: &LocalConnection) -> Result<(), StorageError> {
        if tokio::fs::metadata(&con.path).await.is_err() {
            return Err(StorageError::DeviceNotFound(con.path.clone()));
        }

        let link = self.link_path(&con.path);
        tokio::fs::create_dir_all(self.config.mount_root()).await?;

        // Re-connecting is a no-op success, not an error.
        if !self.link_exists(&link).await {
            tokio::fs::symlink(&con.path, &link).await?;
        }
        Ok(())
    }

    async fn disconnect_one(&self, con: &LocalConnection) -> Result<(), StorageError> {
        let link = self.link_path(&con.path);

        // Absence of the link means already disconnected.
        if self.link_exists(&link).await {
            tokio::fs::remove_file(&link).await?;
        }
        Ok(())
    }

    async fn validate_one(&self, con: &LocalConnection) -> Result<(), StorageError> {
        if tokio::fs::metadata(&con.path).await.is_err() {
            return Err(StorageError::DeviceNotFound(con.path.clone()));
        }
        self.access.validate_access(con.path.as_ref()).await
    }
}

#[async_trait]
impl Connector for LocalConnector {
    type Conn = LocalConnection;

    #[instrument(skip_all, fields(items = batch.len()))]
    async fn connect(&self, batch: &[LocalConnection]) -> Vec<ConnectionStatus> {
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
    async fn disconnect(&self, batch: &[LocalConnection]) -> Vec<ConnectionStatus> {
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
    async fn validate(&self, batch: &[LocalConnection]) -> Vec<ConnectionStatus> {
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
