//! Relay configuration: a JSON file plus environment fallbacks.
//!
//! ```json
//! {
//!   "port": 8080,
//!   "host": "0.0.0.0",
//!   "chains": {
//!     "eip155:1337": {
//!       "signers": ["$RELAYER_PRIVATE_KEY"],
//!       "rpc": [{ "http": "http://localhost:8545", "rate_limit": 50 }]
//!     }
//!   }
//! }
//! ```

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use velocity_chain_eip155::chain as eip155;
use velocity_chain_eip155::chain::config::{Eip155ChainConfig, Eip155ChainConfigInner};
use velocity_types::chain::ChainId;

#[derive(Parser, Debug)]
#[command(name = "velocity-relay")]
#[command(about = "Ordered, nonce-resynchronizing EVM transaction relay")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Missing `host` and `port` fall back to `$HOST` and `$PORT`, then to
/// `0.0.0.0:8080`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    chains: ChainsConfig,
}

/// Configuration of one chain, by CAIP-2 namespace.
#[derive(Debug, Clone)]
pub enum ChainConfig {
    Eip155(Box<Eip155ChainConfig>),
}

impl ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        match self {
            ChainConfig::Eip155(config) => config.chain_id(),
        }
    }
}

/// Chain configurations, written as a map keyed by CAIP-2 chain id.
#[derive(Debug, Clone, Default)]
pub struct ChainsConfig(pub Vec<ChainConfig>);

impl Deref for ChainsConfig {
    type Target = Vec<ChainConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ChainsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{MapAccess, Visitor};
        use std::fmt;

        struct ChainsVisitor;

        impl<'de> Visitor<'de> for ChainsVisitor {
            type Value = ChainsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of chain identifiers to chain configurations")
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut chains = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(chain_id) = access.next_key::<ChainId>()? {
                    let config = match chain_id.namespace() {
                        eip155::EIP155_NAMESPACE => {
                            let inner: Eip155ChainConfigInner = access.next_value()?;
                            let chain_reference = chain_id
                                .try_into()
                                .map_err(|e| serde::de::Error::custom(format!("{e}")))?;
                            ChainConfig::Eip155(Box::new(Eip155ChainConfig {
                                chain_reference,
                                inner,
                            }))
                        }
                        namespace => {
                            return Err(serde::de::Error::custom(format!(
                                "Unexpected namespace: {namespace}"
                            )));
                        }
                    };
                    chains.push(config);
                }
                Ok(ChainsConfig(chains))
            }
        }

        deserializer.deserialize_map(ChainsVisitor)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            chains: ChainsConfig::default(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

    /// `$PORT`, else 8080.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST`, else `0.0.0.0`.
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Configured chains, keyed by CAIP-2 chain id (e.g. `eip155:1337`).
    pub fn chains(&self) -> &ChainsConfig {
        &self.chains
    }

    /// Loads the file named by `--config` / `$CONFIG` (default `./config.json`).
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
