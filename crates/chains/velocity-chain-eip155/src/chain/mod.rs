//! EVM chain support via EIP-155.
//!
//! # Key Types
//!
//! - [`Eip155ChainReference`] - A numeric chain ID for EVM networks (e.g., `1337` for a devnet)
//! - [`Eip155ChainProvider`] - Submits contract calls through cached, nonce-resynchronizing signers
//! - [`Eip155Signer`] - A local key that populates and broadcasts transactions
//! - [`LogCursor`] - Windowed `eth_getLogs` paging

pub mod config;
pub use config::*;

pub mod logs;
pub use logs::*;

pub mod provider;
pub use provider::*;

pub mod signer;
pub use signer::*;

pub mod types;
pub use types::*;

#[cfg(test)]
pub(crate) mod testing;
