//! # libstorage — storage server connection management
//!
//! `libstorage` turns batches of storage connection requests (NFS
//! exports, local directories, iSCSI targets) into mounted or
//! unmounted state on the host, reporting one isolated status per
//! request.  It follows the usual conventions of this codebase: Tokio
//! async runtime, `tracing` for observability, `thiserror` for
//! structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: domain kinds, connection descriptors, statuses, fstab records. |
//! | [`error`] | [`StorageError`] enum covering all failure modes. |
//! | [`config`] | [`StorageConfig`] — repository root, mount timeout, fstab paths. |
//! | [`paths`] | Deterministic remote-path → mountpoint-name transform. |
//! | [`validate`] | Batch validation of raw connection maps into typed descriptors. |
//! | [`mount`] | [`Mounter`] trait and the syscall-backed [`SysMounter`]. |
//! | [`access`] | [`AccessChecker`] trait — directory permission probing. |
//! | [`iscsi`] | [`IscsiSession`] trait and the `iscsiadm`-backed implementation. |
//! | [`connector`] | [`Connector`] trait — connect / disconnect / validate over a batch. |
//! | [`file`] | NFS-style file server connector. |
//! | [`local`] | Local-directory connector (symlinks). |
//! | [`block`] | iSCSI block connector (portal / node sessions). |
//! | [`manager`] | [`StorageConnectionManager`] façade. |
//! | [`fstab`] | Persistent mount-table registrar. |
//!
//! [`Mounter`]: mount::Mounter
//! [`SysMounter`]: mount::SysMounter
//! [`AccessChecker`]: access::AccessChecker
//! [`IscsiSession`]: iscsi::IscsiSession
//! [`Connector`]: connector::Connector
//! [`StorageConfig`]: config::StorageConfig
//! [`StorageError`]: error::StorageError
//! [`StorageConnectionManager`]: manager::StorageConnectionManager

pub mod access;
pub mod block;
pub mod config;
pub mod connector;
pub mod error;
pub mod file;
pub mod fstab;
pub mod iscsi;
pub mod local;
pub mod manager;
pub mod mount;
pub mod paths;
pub mod types;
pub mod validate;

// Re-export the most commonly used items at crate root for convenience.
pub use config::StorageConfig;
pub use connector::Connector;
pub use error::StorageError;
pub use fstab::FsTab;
pub use manager::StorageConnectionManager;
pub use types::*;
