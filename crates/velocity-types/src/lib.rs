#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the Velocity transaction relay.
//!
//! This crate holds the chain-agnostic building blocks shared by the chain
//! support crates and the relay binary.
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 chain identifiers, the provider registry and the
//!   [`FromConfig`](chain::FromConfig) seam
//! - [`config`] - RPC endpoint configuration and environment variable resolution

pub mod chain;
pub mod config;
