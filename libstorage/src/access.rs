//! Directory access validation.
//!
//! Connecting to a share the host cannot read is treated as equivalent
//! to not connecting at all, so every file and local connection is
//! checked for read and traverse access.  In a full deployment this
//! check is proxied through a privileged helper process;
//! [`AccessChecker`] is that boundary, and [`PosixAccessChecker`]
//! performs the check in-process.

use std::path::Path;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::unistd::AccessFlags;

use crate::error::StorageError;

/// Validates that a directory is accessible to the storage consumers.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// Check read and traverse access on `path`.
    ///
    /// Returns [`StorageError::PermissionDenied`] when access is
    /// refused, [`StorageError::Io`] for any other probe failure.
    async fn validate_access(&self, path: &Path) -> Result<(), StorageError>;
}

/// In-process [`AccessChecker`] using `access(2)` with `R_OK | X_OK`.
#[derive(Debug, Default, Clone)]
pub struct PosixAccessChecker;

impl PosixAccessChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessChecker for PosixAccessChecker {
    async fn validate_access(&self, path: &Path) -> Result<(), StorageError> {
        let target = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            nix::unistd::access(&target, AccessFlags::R_OK | AccessFlags::X_OK)
        })
        .await
        .map_err(StorageError::io)?;

        match result {
            Ok(()) => Ok(()),
            Err(Errno::EACCES) => Err(StorageError::PermissionDenied {
                path: path.display().to_string(),
                reason: "read/traverse access refused".to_owned(),
            }),
            Err(errno) => Err(StorageError::Io(format!(
                "access check on {}: {errno}",
                path.display()
            ))),
        }
    }
}
