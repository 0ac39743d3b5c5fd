//! Block connector (iSCSI).
//!
//! Each item selects exactly one of two session flavors, decided once
//! from the presence of its IQN: portal-level discovery when no IQN is
//! supplied, a specific node login otherwise.  Disconnect is
//! symmetric.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument};

use crate::connector::Connector;
use crate::error::StorageError;
use crate::iscsi::IscsiSession;
use crate::types::{BlockConnection, ConnectionStatus, StatusCode};

/// Connector for iSCSI block targets.
pub struct BlockConnector {
    session: Arc<dyn IscsiSession>,
}

impl BlockConnector {
    pub fn new(session: Arc<dyn IscsiSession>) -> Self {
        Self { session }
    }

    async fn connect_one(&self, con: &BlockConnection) -> Result<(), StorageError> {
        match con.iqn.as_deref() {
            None => {
                self.session
                    .add_portal(
                        &con.target_address,
                        &con.target_port,
                        con.initiator_name.as_deref(),
                        &con.username,
                        &con.password,
                    )
                    .await
            }
            Some(iqn) => {
                self.session
                    .add_node(
                        &con.target_address,
                        &con.target_port,
                        iqn,
                        &con.tpgt,
                        con.initiator_name.as_deref(),
                        &con.username,
                        &con.password,
                    )
                    .await
            }
        }
    }

    async fn disconnect_one(&self, con: &BlockConnection) -> Result<(), StorageError> {
        match con.iqn.as_deref() {
            None => {
                self.session
                    .remove_portal(&con.target_address, &con.target_port)
                    .await
            }
            Some(iqn) => {
                self.session
                    .remove_node(&con.target_address, &con.target_port, iqn, &con.tpgt)
                    .await
            }
        }
    }
}

#[async_trait]
impl Connector for BlockConnector {
    type Conn = BlockConnection;

    #[instrument(skip_all, fields(items = batch.len()))]
    async fn connect(&self, batch: &[BlockConnection]) -> Vec<ConnectionStatus> {
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
    async fn disconnect(&self, batch: &[BlockConnection]) -> Vec<ConnectionStatus> {
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

    /// Session-state validation for iSCSI is not implemented; every
    /// item reports success.  Whatever probing is added here later must
    /// never mutate session state.
    #[instrument(skip_all, fields(items = batch.len()))]
    async fn validate(&self, batch: &[BlockConnection]) -> Vec<ConnectionStatus> {
        debug!("iscsi validation is a no-op");
        batch
            .iter()
            .map(|con| ConnectionStatus::ok(&con.id))
            .collect()
    }
}
