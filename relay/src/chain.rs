//! Chain providers served by the relay.

use std::collections::HashMap;
use std::sync::Arc;
use velocity_chain_eip155::chain as eip155;
use velocity_types::chain::{ChainId, ChainProviderOps, ChainRegistry, FromConfig};

use crate::config::{ChainConfig, ChainsConfig};

/// A configured chain provider, by chain family.
#[derive(Debug, Clone)]
pub enum ChainProvider {
    /// EVM chain provider for EIP-155 networks.
    Eip155(Arc<eip155::Eip155ChainProvider>),
}

#[async_trait::async_trait]
impl FromConfig<ChainConfig> for ChainProvider {
    async fn from_config(config: &ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = match config {
            ChainConfig::Eip155(config) => {
                let provider = eip155::Eip155ChainProvider::from_config(config.as_ref()).await?;
                ChainProvider::Eip155(Arc::new(provider))
            }
        };
        Ok(provider)
    }
}

impl ChainProviderOps for ChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        match self {
            ChainProvider::Eip155(provider) => provider.signer_addresses(),
        }
    }

    fn chain_id(&self) -> ChainId {
        match self {
            ChainProvider::Eip155(provider) => provider.chain_id(),
        }
    }
}

/// Builds one provider per configured chain.
///
/// Fails on the first chain whose provider cannot be built.
#[async_trait::async_trait]
impl FromConfig<ChainsConfig> for ChainRegistry<ChainProvider> {
    async fn from_config(chains: &ChainsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut providers = HashMap::new();
        for chain in chains.iter() {
            let chain_provider = ChainProvider::from_config(chain).await?;
            providers.insert(chain_provider.chain_id(), chain_provider);
        }
        Ok(Self::new(providers))
    }
}
