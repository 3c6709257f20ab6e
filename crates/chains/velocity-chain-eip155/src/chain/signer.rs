use alloy_network::{Ethereum, EthereumWallet};
use alloy_primitives::{Address, hex};
use alloy_provider::fillers::{FillProvider, JoinFill, WalletFiller};
use alloy_provider::{Identity, PendingTransactionBuilder, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::{TransportError, TransportResult};
use k256::ecdsa::VerifyingKey;

#[cfg(feature = "telemetry")]
use tracing::Instrument;

use crate::chain::Eip155ChainReference;
use crate::nonce::{BlockTag, TransactionSigner};
use crate::signer_cache::SignerIdentity;

/// Provider that signs outgoing transactions with a single local key.
pub type WalletProvider =
    FillProvider<JoinFill<Identity, WalletFiller<EthereumWallet>>, RootProvider>;

/// A local private key bound to one chain and one RPC connection.
///
/// Fills missing transaction fields from the node: pending nonce, fees
/// (EIP-1559 or legacy gas price, depending on the chain), and a gas limit
/// estimated against the pending block.
#[derive(Debug, Clone)]
pub struct Eip155Signer {
    signer: PrivateKeySigner,
    provider: WalletProvider,
    chain: Eip155ChainReference,
    eip1559: bool,
}

impl Eip155Signer {
    pub fn new(
        signer: PrivateKeySigner,
        client: RpcClient,
        chain: Eip155ChainReference,
        eip1559: bool,
    ) -> Self {
        let signer = signer.with_chain_id(Some(chain.inner()));
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::default()
            .wallet(wallet)
            .connect_client(client);
        Self {
            signer,
            provider,
            chain,
            eip1559,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn provider(&self) -> &WalletProvider {
        &self.provider
    }

    pub fn chain(&self) -> Eip155ChainReference {
        self.chain
    }
}

impl SignerIdentity for Eip155Signer {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn public_key(&self) -> Option<String> {
        let verifying_key: &VerifyingKey = self.signer.credential().verifying_key();
        let point = verifying_key.to_encoded_point(false);
        Some(hex::encode_prefixed(point.as_bytes()))
    }
}

impl TransactionSigner for Eip155Signer {
    type Pending = PendingTransactionBuilder<Ethereum>;
    type Error = TransportError;

    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn transaction_count(&self, tag: BlockTag) -> TransportResult<u64> {
        let call = self.provider.get_transaction_count(self.signer.address());
        match tag {
            BlockTag::Pending => call.pending().await,
            BlockTag::Latest => call.latest().await,
        }
    }

    async fn populate_transaction(
        &self,
        mut tx: TransactionRequest,
    ) -> TransportResult<TransactionRequest> {
        tx.from = Some(self.signer.address());
        tx.chain_id = tx.chain_id.or(Some(self.chain.inner()));
        if tx.nonce.is_none() {
            tx.nonce = Some(self.transaction_count(BlockTag::Pending).await?);
        }

        if self.eip1559 {
            if tx.max_fee_per_gas.is_none() || tx.max_priority_fee_per_gas.is_none() {
                let fees_fut = self.provider.estimate_eip1559_fees();
                #[cfg(feature = "telemetry")]
                let fees = fees_fut
                    .instrument(tracing::info_span!("estimate_eip1559_fees"))
                    .await?;
                #[cfg(not(feature = "telemetry"))]
                let fees = fees_fut.await?;
                tx.max_fee_per_gas = tx.max_fee_per_gas.or(Some(fees.max_fee_per_gas));
                tx.max_priority_fee_per_gas = tx
                    .max_priority_fee_per_gas
                    .or(Some(fees.max_priority_fee_per_gas));
            }
        } else if tx.gas_price.is_none() {
            let gas_fut = self.provider.get_gas_price();
            #[cfg(feature = "telemetry")]
            let gas: u128 = gas_fut
                .instrument(tracing::info_span!("get_gas_price"))
                .await?;
            #[cfg(not(feature = "telemetry"))]
            let gas: u128 = gas_fut.await?;
            tx.gas_price = Some(gas);
        }

        if tx.gas.is_none() {
            let gas_limit = self
                .provider
                .estimate_gas(tx.clone())
                .block(BlockId::pending())
                .await?;
            tx.gas = Some(gas_limit);
        }
        Ok(tx)
    }

    async fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> TransportResult<PendingTransactionBuilder<Ethereum>> {
        let pending = self.provider.send_transaction(tx).await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(
            from = %self.signer.address(),
            tx = %pending.tx_hash(),
            "Transaction broadcast"
        );
        Ok(pending)
    }
}
