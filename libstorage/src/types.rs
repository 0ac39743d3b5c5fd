//! Core storage connection types: domain kinds, descriptors, statuses,
//! and persistent mount-table records.
//!
//! These types form the data model shared by the validator, the
//! connectors, and the manager façade.  They are all
//! [`Serialize`]/[`Deserialize`] so requests and statuses can be
//! carried over a transport as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

// ---------------------------------------------------------------------------
// Domain kinds
// ---------------------------------------------------------------------------

/// The storage backend family a connection request targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    /// Network file server export, mounted over NFS.
    Nfs,
    /// Local directory, exposed through a symbolic link.
    Local,
    /// iSCSI block target (portal or node session).
    Iscsi,
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DomainKind::Nfs => "nfs",
            DomainKind::Local => "local",
            DomainKind::Iscsi => "iscsi",
        };
        f.write_str(name)
    }
}

impl FromStr for DomainKind {
    type Err = StorageError;

    /// Parse a wire-level domain kind tag.  An unrecognized tag is a
    /// caller bug and is rejected before any connection item is looked
    /// at.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nfs" => Ok(DomainKind::Nfs),
            "local" => Ok(DomainKind::Local),
            "iscsi" => Ok(DomainKind::Iscsi),
            other => Err(StorageError::InvalidParameter {
                field: "type".to_owned(),
                detail: format!("unknown domain kind {other:?}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw connection maps and typed descriptors
// ---------------------------------------------------------------------------

/// Loosely-typed connection request as received from the caller.
///
/// Field names are wire-level (`"id"`, `"connection"`, `"iqn"`,
/// `"portal"`, `"port"`, `"user"`, `"password"`, `"initiatorName"`);
/// the [`validate`](crate::validate) module turns a batch of these
/// into typed descriptors.
pub type RawConnection = HashMap<String, String>;

/// Typed descriptor for a file-kind connection (NFS).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConnection {
    /// Opaque caller-supplied correlation token.
    pub id: String,
    /// Export specification, e.g. `"host:/export/path"`.
    pub remote_path: String,
}

/// Typed descriptor for a local-directory connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalConnection {
    /// Opaque caller-supplied correlation token.
    pub id: String,
    /// Source directory on the local host.
    pub path: String,
}

/// Typed descriptor for a block-kind (iSCSI) connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockConnection {
    /// Opaque caller-supplied correlation token.
    pub id: String,
    /// Target portal address (IP or hostname).
    pub target_address: String,
    /// Target portal port.
    pub target_port: String,
    /// Target IQN.  `None` selects portal-level discovery instead of a
    /// specific node login.
    pub iqn: Option<String>,
    /// Target portal group tag.
    pub tpgt: String,
    /// CHAP username (may be empty for unauthenticated targets).
    pub username: String,
    /// CHAP password (may be empty for unauthenticated targets).
    pub password: String,
    /// Initiator name override; `None` uses the host default.
    #[serde(default)]
    pub initiator_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-item statuses
// ---------------------------------------------------------------------------

/// Status code reported for one connection item.
///
/// [`StatusCode::Ok`] is the success sentinel; every other variant is
/// drawn from the error taxonomy in [`error`](crate::error).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    /// The operation succeeded.
    Ok = 0,
    /// Bad or missing request field, or unknown domain kind.
    InvalidParameter = 1,
    /// Local-kind source path does not exist.
    DeviceNotFound = 2,
    /// Mount syscall or mount timeout failure.
    MountError = 3,
    /// Directory access check failed.
    PermissionError = 4,
    /// Unclassified connect failure (including iSCSI login failure).
    ConnectionError = 5,
    /// Unclassified disconnect failure (including iSCSI logout failure).
    DisconnectionError = 6,
    /// Unclassified validate failure.
    ValidationError = 7,
    /// Duplicate persistent mount-table entry.
    AlreadyRegistered = 8,
}

impl StatusCode {
    /// Numeric wire value of this status.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Per-item result of a batch operation.
///
/// One of these is produced for every submitted item, in the same
/// relative order as the input batch.  Callers correlate by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// The correlation token of the input item.
    pub id: String,
    /// Outcome for this item.
    pub status: StatusCode,
}

impl ConnectionStatus {
    pub fn new(id: impl Into<String>, status: StatusCode) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    /// Success status for the given item.
    pub fn ok(id: impl Into<String>) -> Self {
        Self::new(id, StatusCode::Ok)
    }
}

// ---------------------------------------------------------------------------
// Persistent mount-table records
// ---------------------------------------------------------------------------

/// One parsed line of the persistent mount table.
///
/// The on-disk form is six whitespace-separated fields: device,
/// mountpoint, filesystem type, comma-joined options, dump frequency,
/// pass number.  The device field is either a literal device path or a
/// `UUID=<value>` reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FstabRecord {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
    pub dump: u32,
    pub pass: u32,
}
