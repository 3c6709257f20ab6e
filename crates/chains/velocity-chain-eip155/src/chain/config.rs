use alloy_primitives::B256;
use serde::Deserialize;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;
use velocity_types::chain::ChainId;
use velocity_types::config::{LiteralOrEnv, RpcConfig};

use crate::chain::Eip155ChainReference;
use crate::nonce::NonceConflictConfig;

#[derive(Debug, Clone)]
pub struct Eip155ChainConfig {
    pub chain_reference: Eip155ChainReference,
    pub inner: Eip155ChainConfigInner,
}

impl Eip155ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        self.chain_reference.into()
    }
    pub fn eip1559(&self) -> bool {
        self.inner.eip1559
    }
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.inner.receipt_timeout_secs)
    }
    pub fn confirmations(&self) -> u64 {
        self.inner.confirmations
    }
    pub fn log_window(&self) -> NonZeroU64 {
        self.inner.log_window
    }
    pub fn signers(&self) -> &Eip155SignersConfig {
        &self.inner.signers
    }
    pub fn rpc(&self) -> &Vec<RpcConfig> {
        &self.inner.rpc
    }
    pub fn nonce_conflict(&self) -> &NonceConflictConfig {
        &self.inner.nonce_conflict
    }
    pub fn chain_reference(&self) -> Eip155ChainReference {
        self.chain_reference
    }
}

/// Configuration specific to EVM-compatible chains.
#[derive(Debug, Clone, Deserialize)]
pub struct Eip155ChainConfigInner {
    /// Whether the chain supports EIP-1559 gas pricing.
    #[serde(default = "eip155_chain_config::default_eip1559")]
    pub eip1559: bool,
    /// Signer configuration for this chain (required).
    /// Array of private keys (hex format) or env var references.
    pub signers: Eip155SignersConfig,
    /// RPC provider configuration for this chain (required).
    pub rpc: Vec<RpcConfig>,
    /// How long to wait for a transaction receipt.
    #[serde(default = "eip155_chain_config::default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Block confirmations required before a receipt is returned.
    #[serde(default = "eip155_chain_config::default_confirmations")]
    pub confirmations: u64,
    /// Maximum number of blocks requested per `eth_getLogs` call. Zero is rejected.
    #[serde(
        default = "eip155_chain_config::default_log_window",
        deserialize_with = "eip155_chain_config::deserialize_log_window"
    )]
    pub log_window: NonZeroU64,
    /// Errors treated as stale-nonce rejections.
    #[serde(default)]
    pub nonce_conflict: NonceConflictConfig,
}

mod eip155_chain_config {
    use serde::{Deserialize, Deserializer};
    use std::num::NonZeroU64;

    pub fn default_eip1559() -> bool {
        true
    }
    pub fn default_receipt_timeout_secs() -> u64 {
        30
    }
    pub fn default_confirmations() -> u64 {
        1
    }
    pub fn default_log_window() -> NonZeroU64 {
        NonZeroU64::new(500).unwrap_or(NonZeroU64::MIN)
    }
    pub fn deserialize_log_window<'de, D>(deserializer: D) -> Result<NonZeroU64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let window = u64::deserialize(deserializer)?;
        NonZeroU64::new(window)
            .ok_or_else(|| serde::de::Error::custom("log_window must be greater than zero"))
    }
}

/// Configuration for EVM signers.
///
/// Each entry is a 0x-prefixed hex private key or an environment variable
/// reference:
///
/// ```json
/// {
///   "signers": [
///     "$RELAY_SIGNER_KEY",
///     "0xcafe000000000000000000000000000000000000000000000000000000000001"
///   ]
/// }
/// ```
pub type Eip155SignersConfig = Vec<LiteralOrEnv<EvmPrivateKey>>;

/// A validated EVM private key (32 bytes).
#[derive(Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }

    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl std::fmt::Debug for EvmPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EvmPrivateKey(***)")
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid evm private key: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xcafe000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_defaults_are_applied() {
        let inner: Eip155ChainConfigInner = serde_json::from_value(serde_json::json!({
            "signers": [KEY],
            "rpc": [{"http": "http://localhost:8545"}]
        }))
        .unwrap();
        let config = Eip155ChainConfig {
            chain_reference: Eip155ChainReference::new(1337),
            inner,
        };

        assert!(config.eip1559());
        assert_eq!(config.receipt_timeout(), Duration::from_secs(30));
        assert_eq!(config.confirmations(), 1);
        assert_eq!(config.log_window().get(), 500);
        assert_eq!(config.nonce_conflict(), &NonceConflictConfig::default());
        assert_eq!(config.chain_id().to_string(), "eip155:1337");
        assert_eq!(config.signers().len(), 1);
    }

    #[test]
    fn test_log_window_must_be_positive() {
        let parse = |window: u64| {
            serde_json::from_value::<Eip155ChainConfigInner>(serde_json::json!({
                "signers": [KEY],
                "rpc": [{"http": "http://localhost:8545"}],
                "log_window": window,
            }))
        };
        let error = parse(0).unwrap_err();
        assert!(error.to_string().contains("log_window must be greater than zero"), "{error}");
        assert_eq!(parse(1).unwrap().log_window.get(), 1);
        assert_eq!(parse(2000).unwrap().log_window.get(), 2000);
    }

    #[test]
    fn test_signer_keys_resolve_from_env() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("VELOCITY_EIP155_TEST_SIGNER_KEY", KEY) };
        let signers: Eip155SignersConfig =
            serde_json::from_str(r#"["$VELOCITY_EIP155_TEST_SIGNER_KEY"]"#).unwrap();
        assert_eq!(signers[0].as_b256(), &B256::from_str(KEY).unwrap());
        assert_eq!(format!("{:?}", signers[0].inner()), "EvmPrivateKey(***)");
    }

    #[test]
    fn test_invalid_private_key_is_rejected() {
        let result: Result<Eip155SignersConfig, _> = serde_json::from_str(r#"["0x1234"]"#);
        assert!(result.is_err());
    }
}
