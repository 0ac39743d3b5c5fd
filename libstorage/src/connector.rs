//! Connector trait.
//!
//! One connector exists per domain kind (file, local, block), each
//! implementing the same three batch operations.  The manager selects
//! the connector once per call; the connectors never branch on domain
//! kind themselves.

use async_trait::async_trait;

use crate::types::ConnectionStatus;

/// Batch connect / disconnect / validate for one domain kind.
///
/// Every method returns exactly one [`ConnectionStatus`] per input
/// item, in input order.  Once a batch has passed validation, nothing
/// that goes wrong while handling one item may abort the batch: item
/// failures are converted into that item's status and processing
/// continues with the next item.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Typed descriptor this connector operates on.
    type Conn: Send + Sync;

    /// Establish each connection in the batch.
    ///
    /// Idempotent per item — connecting an already-connected item
    /// succeeds without duplicating state.
    async fn connect(&self, batch: &[Self::Conn]) -> Vec<ConnectionStatus>;

    /// Tear down each connection in the batch.
    ///
    /// Idempotent per item — disconnecting a never-connected item is
    /// not an error.
    async fn disconnect(&self, batch: &[Self::Conn]) -> Vec<ConnectionStatus>;

    /// Check that each connection in the batch could be established,
    /// without leaving any persistent state behind.
    async fn validate(&self, batch: &[Self::Conn]) -> Vec<ConnectionStatus>;
}
