//! Configuration types shared across the relay.
//!
//! # Environment Variable Resolution
//!
//! The [`LiteralOrEnv`] wrapper lets configuration values be written either
//! literally or as references to environment variables:
//!
//! ```json
//! {
//!   "http": "http://localhost:8545",
//!   "bearer_token": "$RPC_TOKEN",
//!   "signers": ["${RELAY_SIGNER_KEY}"]
//! }
//! ```
//!
//! Secrets stay out of the configuration file and are resolved at load time.

use serde::Deserialize;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use url::Url;

/// Configuration of a single JSON-RPC endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// HTTP URL for the RPC endpoint.
    pub http: Url,
    /// Rate limit for requests per second (optional).
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// Token sent as `Authorization: Bearer <token>` with every request (optional).
    #[serde(default)]
    pub bearer_token: Option<LiteralOrEnv<BearerToken>>,
}

/// An opaque RPC credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl FromStr for BearerToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() {
            return Err("bearer token must not be empty".to_string());
        }
        Ok(Self(token.to_string()))
    }
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Accepts a literal (`"http://localhost:8545"`), a simple reference
/// (`"$RPC_TOKEN"`), or a braced reference (`"${RPC_TOKEN}"`). The resolved
/// string is then parsed with `T::from_str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if `s` is written as `$VAR` or `${VAR}`.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            return Some(name);
        }
        let name = s.strip_prefix('$')?;
        let is_identifier =
            !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        is_identifier.then_some(name)
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = match Self::parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?,
            None => s,
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_syntax() {
        assert_eq!(LiteralOrEnv::<u32>::parse_env_var_syntax("$RPC"), Some("RPC"));
        assert_eq!(
            LiteralOrEnv::<u32>::parse_env_var_syntax("${RPC_TOKEN}"),
            Some("RPC_TOKEN")
        );
        assert_eq!(LiteralOrEnv::<u32>::parse_env_var_syntax("$"), None);
        assert_eq!(LiteralOrEnv::<u32>::parse_env_var_syntax("$not-a-var"), None);
        assert_eq!(LiteralOrEnv::<u32>::parse_env_var_syntax("literal"), None);
    }

    #[test]
    fn test_literal_value_is_parsed() {
        let value: LiteralOrEnv<u32> = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn test_missing_env_var_is_reported() {
        let result: Result<LiteralOrEnv<u32>, _> =
            serde_json::from_str("\"$VELOCITY_TYPES_TEST_SURELY_UNSET\"");
        let error = result.unwrap_err().to_string();
        assert!(error.contains("VELOCITY_TYPES_TEST_SURELY_UNSET"));
    }

    #[test]
    fn test_rpc_config_with_token() {
        let config: RpcConfig = serde_json::from_str(
            r#"{"http": "http://localhost:8545", "rate_limit": 10, "bearer_token": "secret"}"#,
        )
        .unwrap();
        assert_eq!(config.http.as_str(), "http://localhost:8545/");
        assert_eq!(config.rate_limit, Some(10));
        let token = config.bearer_token.as_ref().unwrap();
        assert_eq!(token.expose(), "secret");
        assert_eq!(format!("{:?}", token.inner()), "BearerToken(***)");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_empty_bearer_token_is_rejected() {
        let result: Result<RpcConfig, _> =
            serde_json::from_str(r#"{"http": "http://localhost:8545", "bearer_token": "  "}"#);
        assert!(result.is_err());
    }
}
