//! Chain identifiers and provider registry.
//!
//! - [`ChainId`] - A CAIP-2 chain identifier (e.g., `eip155:1337`)
//! - [`ChainRegistry`] - Configured chain providers indexed by chain id
//! - [`FromConfig`] - Async construction of providers and registries from configuration

mod chain_id;

pub use chain_id::*;

use std::collections::HashMap;
use std::sync::Arc;

/// Asynchronously constructs an instance of `Self` from a configuration type.
///
/// Used to build chain providers, and the registry of them, from the relay
/// configuration file.
///
/// Returns an error if the configuration is invalid or a required external
/// connection cannot be established.
#[async_trait::async_trait]
pub trait FromConfig<TConfig>
where
    Self: Sized,
{
    async fn from_config(config: &TConfig) -> Result<Self, Box<dyn std::error::Error>>;
}

/// Common operations available on all chain providers.
pub trait ChainProviderOps {
    /// Addresses of all configured signers for this chain, as displayed to users.
    fn signer_addresses(&self) -> Vec<String>;

    /// The CAIP-2 chain identifier served by this provider.
    fn chain_id(&self) -> ChainId;
}

impl<T: ChainProviderOps> ChainProviderOps for Arc<T> {
    fn signer_addresses(&self) -> Vec<String> {
        (**self).signer_addresses()
    }
    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }
}

/// Registry of configured chain providers indexed by chain id.
#[derive(Debug)]
pub struct ChainRegistry<P>(HashMap<ChainId, P>);

impl<P> ChainRegistry<P> {
    pub fn new(providers: HashMap<ChainId, P>) -> Self {
        Self(providers)
    }

    /// Looks up a provider by exact chain id.
    pub fn by_chain_id(&self, chain_id: &ChainId) -> Option<&P> {
        self.0.get(chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &P)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P: ChainProviderOps> FromIterator<P> for ChainRegistry<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let providers = iter
            .into_iter()
            .map(|provider| (provider.chain_id(), provider))
            .collect();
        Self(providers)
    }
}
