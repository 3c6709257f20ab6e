//! CAIP-2 chain identifiers.
//!
//! A [CAIP-2](https://standards.chainagnostic.org/CAIPs/caip-2) identifier names a
//! chain as `namespace:reference`, e.g. `eip155:1` for Ethereum mainnet or
//! `eip155:1337` for a local development node. The relay keys its chain
//! configuration and provider registry by these identifiers.
//!
//! ```
//! use velocity_types::chain::ChainId;
//!
//! let devnet: ChainId = "eip155:1337".parse().unwrap();
//! assert_eq!(devnet.namespace(), "eip155");
//! assert_eq!(devnet.reference(), "1337");
//! assert_eq!(devnet.to_string(), "eip155:1337");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 chain identifier.
///
/// Serializes to and from the colon-separated string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    /// Chain family, e.g. `eip155`.
    pub namespace: String,
    /// Chain within the family, e.g. `1337`.
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Returned when a string is not of the form `namespace:reference` with both parts non-empty.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(ChainId::new(namespace, reference))
            }
            _ => Err(ChainIdFormatError(s.into())),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_serializes_as_string() {
        let chain_id = ChainId::new("eip155", "1337");
        let serialized = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(serialized, "\"eip155:1337\"");
    }

    #[test]
    fn test_chain_id_deserialize() {
        let chain_id: ChainId = serde_json::from_str("\"eip155:2021\"").unwrap();
        assert_eq!(chain_id.namespace, "eip155");
        assert_eq!(chain_id.reference, "2021");
    }

    #[test]
    fn test_chain_id_keeps_colons_in_reference() {
        let chain_id: ChainId = "bip122:000000000019d6689c085ae165831e93:extra".parse().unwrap();
        assert_eq!(chain_id.namespace, "bip122");
        assert_eq!(chain_id.reference, "000000000019d6689c085ae165831e93:extra");
    }

    #[test]
    fn test_chain_id_rejects_malformed_input() {
        assert!("eip155".parse::<ChainId>().is_err());
        assert!(":1".parse::<ChainId>().is_err());
        assert!("eip155:".parse::<ChainId>().is_err());
        let result: Result<ChainId, _> = serde_json::from_str("\"invalid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_chain_id_accepts_unknown_namespace() {
        let result: Result<ChainId, _> = serde_json::from_str("\"unknown:1\"");
        assert!(result.is_ok());
    }
}
