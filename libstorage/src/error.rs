//! Storage error types.
//!
//! All errors in the `libstorage` crate are represented by the
//! [`StorageError`] enum, which derives [`thiserror::Error`] for
//! ergonomic error handling and also implements
//! [`Serialize`]/[`Deserialize`] so errors can travel alongside the
//! data model.
//!
//! Only [`StorageError::InvalidParameter`] ever aborts a whole batch
//! call; every other variant is caught at the single-item boundary and
//! converted into that item's [`StatusCode`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StatusCode;

/// Unified error type for storage connection operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum StorageError {
    /// The caller supplied a malformed request: a missing required
    /// field or an unknown domain kind.  Aborts the whole batch call.
    #[error("invalid parameter {field}: {detail}")]
    InvalidParameter {
        /// The offending request field.
        field: String,
        /// Human-readable detail, naming the item id when known.
        detail: String,
    },

    /// A local-kind source path does not exist.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A mount operation failed or timed out.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed or timed out.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A directory access check was denied.
    #[error("permission denied at {path}: {reason}")]
    PermissionDenied {
        /// Path that failed the access check.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An iSCSI session operation (login/logout, portal add/remove)
    /// failed.
    #[error("iscsi session error for {target}: {reason}")]
    SessionFailed {
        /// Portal or node the operation targeted.
        target: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The device is already present in the persistent mount table.
    #[error("device {0} already registered in mount table")]
    AlreadyRegistered(String),

    /// An unclassified I/O or internal error.
    #[error("storage i/o error: {0}")]
    Io(String),
}

impl StorageError {
    /// Create a [`StorageError::Io`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn io<E: std::fmt::Display>(e: E) -> Self {
        Self::Io(e.to_string())
    }

    /// Missing-field error for the given item id, matching the
    /// batch-level validation contract.
    pub fn missing_field(field: &str, item_id: &str) -> Self {
        Self::InvalidParameter {
            field: field.to_owned(),
            detail: format!("parameter is missing from connection {item_id:?}"),
        }
    }

    /// Map this error to a per-item status code, when the error kind
    /// has a dedicated one.
    ///
    /// Returns `None` for unclassified kinds; the connector handling
    /// the item substitutes the generic code of the operation being
    /// performed (connection / disconnection / validation error).
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::InvalidParameter { .. } => Some(StatusCode::InvalidParameter),
            Self::DeviceNotFound(_) => Some(StatusCode::DeviceNotFound),
            Self::MountFailed { .. } => Some(StatusCode::MountError),
            Self::PermissionDenied { .. } => Some(StatusCode::PermissionError),
            Self::AlreadyRegistered(_) => Some(StatusCode::AlreadyRegistered),
            Self::UnmountFailed { .. } | Self::SessionFailed { .. } | Self::Io(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
