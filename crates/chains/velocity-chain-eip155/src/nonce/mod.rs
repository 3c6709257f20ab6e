//! Nonce management for a single signing account.
//!
//! Layered bottom-up:
//!
//! - [`TransactionSigner`] - an account that can count, fill, sign, and broadcast transactions
//! - [`NonceTrackingSigner`] - assigns nonces locally as `pending count + delta`
//! - [`ResyncingNonceManager`] - serializes submissions and retries once with a fresh
//!   nonce when the node reports a [nonce conflict](NonceConflictClassifier)

mod conflict;
mod resync;
mod tracker;

pub use conflict::*;
pub use resync::*;
pub use tracker::*;

use alloy_primitives::Address;
use alloy_rpc_types_eth::TransactionRequest;
use std::future::Future;

/// Block against which an account's transaction count is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// Mined transactions only.
    Latest,
    /// Mined transactions plus those waiting in the node's mempool.
    Pending,
}

/// An account able to sign and broadcast transactions.
pub trait TransactionSigner: Send + Sync + 'static {
    /// Handle to a broadcast transaction.
    type Pending: Send + 'static;
    type Error: ErrorNode + std::error::Error + Send + Sync + 'static;

    fn address(&self) -> Address;

    /// Number of transactions sent from this account as of `tag`.
    fn transaction_count(
        &self,
        tag: BlockTag,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Fills every field of `tx` the caller left unset: sender, chain id,
    /// nonce, fees, and gas limit. Fields already set are kept.
    fn populate_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TransactionRequest, Self::Error>> + Send;

    /// Signs and broadcasts a fully populated transaction.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<Self::Pending, Self::Error>> + Send;
}

/// A signer that assigns nonces itself instead of asking the node every time.
pub trait NonceManagedSigner: Send + Sync + 'static {
    type Pending: Send + 'static;
    type Error: ErrorNode + std::error::Error + Send + Sync + 'static;

    fn address(&self) -> Address;

    /// The nonce the next transaction would use.
    fn get_nonce(&self, tag: BlockTag) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Marks one more nonce as used.
    fn increment(&self);

    /// Forgets all local nonce state; the next nonce comes from the node.
    fn reset(&self);

    /// Assigns the next nonce, then populates and broadcasts `tx`.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<Self::Pending, Self::Error>> + Send;

    fn populate_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TransactionRequest, Self::Error>> + Send;

    /// Broadcasts `tx` as is, without touching local nonce state.
    fn send_populated_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<Self::Pending, Self::Error>> + Send;
}
