//! iSCSI session collaborator.
//!
//! [`IscsiSession`] is the seam between the block connector and the
//! iSCSI protocol mechanics.  Portal-level operations target a
//! discovery endpoint (`address:port`) without a specific target;
//! node-level operations target one named target (IQN).
//!
//! [`IscsiAdm`] is the real implementation, shelling out to the
//! `iscsiadm` administration tool.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::StorageError;

/// Manages iSCSI portal and node sessions.
#[async_trait]
pub trait IscsiSession: Send + Sync {
    /// Discover and log in at portal level.
    async fn add_portal(
        &self,
        address: &str,
        port: &str,
        initiator_name: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<(), StorageError>;

    /// Log in to one specific target node.
    #[allow(clippy::too_many_arguments)]
    async fn add_node(
        &self,
        address: &str,
        port: &str,
        iqn: &str,
        tpgt: &str,
        initiator_name: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<(), StorageError>;

    /// Remove a portal-level discovery record.
    async fn remove_portal(&self, address: &str, port: &str) -> Result<(), StorageError>;

    /// Log out of and remove one specific target node.
    async fn remove_node(
        &self,
        address: &str,
        port: &str,
        iqn: &str,
        tpgt: &str,
    ) -> Result<(), StorageError>;
}

/// [`IscsiSession`] backed by the `iscsiadm` command-line tool.
#[derive(Debug, Clone)]
pub struct IscsiAdm {
    binary: String,
}

impl Default for IscsiAdm {
    fn default() -> Self {
        Self {
            binary: "iscsiadm".to_owned(),
        }
    }
}

impl IscsiAdm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one `iscsiadm` invocation, mapping a spawn failure or a
    /// non-zero exit to [`StorageError::SessionFailed`].
    async fn run(&self, args: &[&str], target: &str) -> Result<(), StorageError> {
        debug!(target, ?args, "running iscsiadm");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| StorageError::SessionFailed {
                target: target.to_owned(),
                reason: format!("failed to spawn {}: {e}", self.binary),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StorageError::SessionFailed {
                target: target.to_owned(),
                reason: format!(
                    "iscsiadm exited with {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }

    /// Push CHAP credentials onto a node record before login.
    async fn update_node_auth(
        &self,
        node_args: &[&str],
        target: &str,
        user: &str,
        password: &str,
    ) -> Result<(), StorageError> {
        for (name, value) in [
            ("node.session.auth.authmethod", "CHAP"),
            ("node.session.auth.username", user),
            ("node.session.auth.password", password),
        ] {
            let mut args = node_args.to_vec();
            args.extend(["-o", "update", "-n", name, "-v", value]);
            self.run(&args, target).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl IscsiSession for IscsiAdm {
    async fn add_portal(
        &self,
        address: &str,
        port: &str,
        initiator_name: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<(), StorageError> {
        let portal = format!("{address}:{port}");
        let mut args = vec!["-m", "discovery", "-t", "sendtargets", "-p", portal.as_str()];
        if let Some(initiator) = initiator_name {
            args.extend(["-I", initiator]);
        }
        if !user.is_empty() {
            args.extend(["-u", user, "-w", password]);
        }
        self.run(&args, &portal).await
    }

    async fn add_node(
        &self,
        address: &str,
        port: &str,
        iqn: &str,
        tpgt: &str,
        initiator_name: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<(), StorageError> {
        let portal = format!("{address}:{port},{tpgt}");
        let target = format!("{iqn} at {portal}");

        let mut node_args = vec!["-m", "node", "-T", iqn, "-p", portal.as_str()];
        if let Some(initiator) = initiator_name {
            node_args.extend(["-I", initiator]);
        }

        let mut new_args = node_args.clone();
        new_args.extend(["-o", "new"]);
        self.run(&new_args, &target).await?;

        if !user.is_empty() {
            self.update_node_auth(&node_args, &target, user, password)
                .await?;
        }

        let mut login_args = node_args.clone();
        login_args.push("-l");
        self.run(&login_args, &target).await
    }

    async fn remove_portal(&self, address: &str, port: &str) -> Result<(), StorageError> {
        let portal = format!("{address}:{port}");
        self.run(
            &[
                "-m",
                "discoverydb",
                "-t",
                "sendtargets",
                "-p",
                portal.as_str(),
                "-o",
                "delete",
            ],
            &portal,
        )
        .await
    }

    async fn remove_node(
        &self,
        address: &str,
        port: &str,
        iqn: &str,
        tpgt: &str,
    ) -> Result<(), StorageError> {
        let portal = format!("{address}:{port},{tpgt}");
        let target = format!("{iqn} at {portal}");
        let node_args = ["-m", "node", "-T", iqn, "-p", portal.as_str()];

        let mut logout_args = node_args.to_vec();
        logout_args.push("-u");
        self.run(&logout_args, &target).await?;

        let mut delete_args = node_args.to_vec();
        delete_args.extend(["-o", "delete"]);
        self.run(&delete_args, &target).await
    }
}
