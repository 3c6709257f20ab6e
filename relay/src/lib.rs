#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP relay for ordered, nonce-resynchronizing EVM transaction submission.
//!
//! Clients post contract calls; the relay signs them with one of its
//! configured keys and broadcasts them. Calls from the same signer go through
//! a single nonce manager, so they are broadcast in arrival order and a stale
//! nonce is recovered from with one resynchronized retry.
//!
//! # Modules
//!
//! - [`config`] - JSON configuration with environment fallbacks
//! - [`chain`] - Chain providers built from configuration
//! - [`relay`] - [`TransactionRelay`] and its registry-backed implementation
//! - [`handlers`] - HTTP endpoints
//! - [`util`] - Graceful shutdown and telemetry

pub mod chain;
pub mod config;
pub mod handlers;
pub mod relay;
pub mod util;

pub use relay::*;
