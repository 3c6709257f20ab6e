//! Ordered, nonce-resynchronizing transaction submission for EVM chains.
//!
//! Submitting many transactions from one account is fragile: each needs the
//! next nonce, and a nonce that went stale (another process sent from the same
//! key, the node dropped a transaction, a previous submission half-failed)
//! gets the transaction rejected. This crate layers three pieces to keep
//! submissions flowing:
//!
//! - [`queue`] - runs asynchronous tasks strictly one after another, isolating failures
//! - [`nonce`] - assigns nonces locally and, on a nonce conflict, resets and retries
//!   once with a nonce resynchronized from the node
//! - [`signer_cache`] - shares one nonce manager per account and RPC connection
//!
//! [`chain`] puts them together for alloy-based EVM providers.
//!
//! # Feature Flags
//!
//! - `telemetry` - tracing spans and events
//!
//! # Example
//!
//! ```ignore
//! use velocity_chain_eip155::chain::{ContractCall, Eip155ChainProvider};
//! use velocity_types::chain::FromConfig;
//!
//! let provider = Eip155ChainProvider::from_config(&config).await?;
//! let submitted = provider
//!     .send_transaction(ContractCall { to, calldata, wait: true, ..Default::default() })
//!     .await?;
//! println!("mined {}", submitted.tx_hash);
//! ```

pub mod chain;
pub mod nonce;
pub mod queue;
pub mod signer_cache;

pub use chain::{Eip155ChainProvider, Eip155ChainReference};
