use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, B256, Bytes, TxHash, U256};
use alloy_provider::{PendingTransactionError, RootProvider, WatchTxError};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport::{TransportError, TransportResult};
use alloy_transport_http::Http;
use alloy_transport_http::reqwest;
use alloy_transport_http::reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceBuilder;
use velocity_types::chain::{ChainId, ChainProviderOps, FromConfig};
use velocity_types::config::RpcConfig;

use crate::chain::config::Eip155ChainConfig;
use crate::chain::logs::LogCursor;
use crate::chain::signer::Eip155Signer;
use crate::chain::types::Eip155ChainReference;
use crate::nonce::{
    NonceConflictClassifier, NonceConflictConfigError, NonceManagedSigner, NonceTrackingSigner,
    ResyncingNonceManager, SubmissionError,
};
use crate::queue::QueueTaskError;
use crate::signer_cache::{ConnectionId, ConnectionScope, SignerCache, SignerKey};

/// Nonce manager wrapping one configured EVM key.
pub type Eip155NonceManager = ResyncingNonceManager<NonceTrackingSigner<Eip155Signer>>;

static SHARED_SIGNER_CACHE: Lazy<Arc<SignerCache<Eip155NonceManager>>> =
    Lazy::new(|| Arc::new(SignerCache::new()));

impl SignerCache<Eip155NonceManager> {
    /// The process-wide cache used by providers built through [`FromConfig`].
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_SIGNER_CACHE)
    }
}

/// Provider for submitting transactions to an EVM-compatible chain.
///
/// Every provider instance is its own connection: it builds one RPC client
/// and registers its signers' nonce managers in the [`SignerCache`] under a
/// fresh [`ConnectionId`]. Managers are created on first use and evicted when
/// the provider is dropped.
///
/// # Multiple Signers
///
/// When a call does not name its sender, signers are selected in round-robin
/// fashion. Each signer has its own submission queue, so transactions from
/// different signers do not wait for each other.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    chain: Eip155ChainReference,
    connection: ConnectionId,
    reader: RootProvider,
    /// Configured signers, in configuration order.
    signers: Vec<Eip155Signer>,
    /// Current position in round-robin signer rotation.
    signer_cursor: AtomicUsize,
    signer_cache: Arc<SignerCache<Eip155NonceManager>>,
    classifier: Arc<NonceConflictClassifier>,
    receipt_timeout: Duration,
    confirmations: u64,
    log_window: NonZeroU64,
}

#[derive(Debug, thiserror::Error)]
pub enum Eip155ProviderError {
    #[error("At least one signer should be provided")]
    NoSigners,
    #[error("At least one http(s) RPC endpoint should be provided")]
    NoTransports,
    #[error("Invalid signer key: {0}")]
    InvalidSigner(String),
    #[error("Invalid bearer token: {0}")]
    InvalidBearerToken(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    NonceConflict(#[from] NonceConflictConfigError),
}

impl Eip155ChainProvider {
    /// Builds a provider whose nonce managers live in `signer_cache`.
    pub fn try_new(
        config: &Eip155ChainConfig,
        signer_cache: Arc<SignerCache<Eip155NonceManager>>,
    ) -> Result<Self, Eip155ProviderError> {
        let client = Self::rpc_client(&config.chain_id(), config.rpc())?;
        let signers = config
            .signers()
            .iter()
            .map(|key| {
                PrivateKeySigner::from_bytes(key.as_b256())
                    .map(|signer| {
                        Eip155Signer::new(
                            signer,
                            client.clone(),
                            config.chain_reference(),
                            config.eip1559(),
                        )
                    })
                    .map_err(|e| Eip155ProviderError::InvalidSigner(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if signers.is_empty() {
            return Err(Eip155ProviderError::NoSigners);
        }
        let classifier = NonceConflictClassifier::try_from(config.nonce_conflict())?;
        let connection = ConnectionId::next();

        #[cfg(feature = "telemetry")]
        tracing::info!(
            chain = %config.chain_id(),
            %connection,
            signers = ?signers.iter().map(Eip155Signer::address).collect::<Vec<_>>(),
            "Using EVM provider"
        );

        Ok(Self {
            chain: config.chain_reference(),
            connection,
            reader: RootProvider::new(client),
            signers,
            signer_cursor: AtomicUsize::new(0),
            signer_cache,
            classifier: Arc::new(classifier),
            receipt_timeout: config.receipt_timeout(),
            confirmations: config.confirmations(),
            log_window: config.log_window(),
        })
    }

    #[allow(unused_variables)] // chain_id is needed for tracing only here
    pub fn rpc_client(
        chain_id: &ChainId,
        rpc: &[RpcConfig],
    ) -> Result<RpcClient, Eip155ProviderError> {
        let mut transports = Vec::with_capacity(rpc.len());
        for provider_config in rpc {
            let scheme = provider_config.http.scheme();
            let is_http = scheme == "http" || scheme == "https";
            if !is_http {
                continue;
            }
            #[cfg(feature = "telemetry")]
            tracing::info!(
                chain = %chain_id,
                rpc_url = %provider_config.http,
                rate_limit = ?provider_config.rate_limit,
                authenticated = provider_config.bearer_token.is_some(),
                "Using HTTP transport"
            );
            let rate_limit = provider_config.rate_limit.unwrap_or(u32::MAX);
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit))
                .service(Self::http_transport(provider_config)?);
            transports.push(service);
        }
        let active_transports =
            NonZeroUsize::new(transports.len()).ok_or(Eip155ProviderError::NoTransports)?;
        let fallback = ServiceBuilder::new()
            .layer(FallbackLayer::default().with_active_transport_count(active_transports))
            .service(transports);
        Ok(RpcClient::new(fallback, false))
    }

    /// HTTP transport that authenticates every request when a bearer token is configured.
    fn http_transport(config: &RpcConfig) -> Result<Http<reqwest::Client>, Eip155ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Http::with_client(client, config.http.clone()))
    }

    pub fn chain(&self) -> Eip155ChainReference {
        self.chain
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Read-only access to the chain, without any signer.
    pub fn reader(&self) -> &RootProvider {
        &self.reader
    }

    /// The cached nonce manager for `address`, or `None` if no such signer is configured.
    pub fn signer(&self, address: Address) -> Option<Arc<Eip155NonceManager>> {
        let signer = self.signers.iter().find(|s| s.address() == address)?;
        Some(self.cached_manager(signer))
    }

    /// The first configured signer.
    pub fn default_signer(&self) -> Arc<Eip155NonceManager> {
        self.cached_manager(&self.signers[0])
    }

    /// Round-robin selection of the next signer.
    pub fn next_signer(&self) -> Arc<Eip155NonceManager> {
        let next = if self.signers.len() == 1 {
            0
        } else {
            self.signer_cursor.fetch_add(1, Ordering::Relaxed) % self.signers.len()
        };
        self.cached_manager(&self.signers[next])
    }

    /// A nonce manager for `address` that shares no state with any other.
    ///
    /// Transactions sent through it are not ordered against the cached manager
    /// of the same account.
    pub fn uncached_signer(&self, address: Address) -> Option<Eip155NonceManager> {
        let signer = self.signers.iter().find(|s| s.address() == address)?;
        Some(self.new_manager(signer.clone()))
    }

    fn cached_manager(&self, signer: &Eip155Signer) -> Arc<Eip155NonceManager> {
        let scope = ConnectionScope::Connection(self.connection);
        self.signer_cache
            .get_or_create(scope, SignerKey::of(signer), || self.new_manager(signer.clone()))
    }

    fn new_manager(&self, signer: Eip155Signer) -> Eip155NonceManager {
        ResyncingNonceManager::new(NonceTrackingSigner::new(signer))
            .with_classifier(Arc::clone(&self.classifier))
    }

    /// Submits a contract call and, if requested, waits for its receipt.
    ///
    /// The call goes through the sender's nonce manager, so calls from the same
    /// signer are broadcast strictly in order and a stale nonce is retried once
    /// with a nonce resynchronized from the node.
    ///
    /// If the receipt cannot be obtained (timeout or watcher failure) the
    /// sender's local nonce state is reset, since it is unknown whether the
    /// transaction will be mined.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(skip_all, err, fields(chain = %self.chain, to = %call.to))
    )]
    pub async fn send_transaction(
        &self,
        call: ContractCall,
    ) -> Result<SubmittedTransaction, ContractCallError> {
        let manager = match call.from {
            Some(from) => self
                .signer(from)
                .ok_or(ContractCallError::UnknownSigner(from))?,
            None => self.next_signer(),
        };
        let from = manager.address();

        let mut tx = TransactionRequest::default()
            .with_to(call.to)
            .with_input(call.calldata);
        if let Some(value) = call.value {
            tx.set_value(value);
        }
        if let Some(gas_limit) = call.gas_limit {
            tx.set_gas_limit(gas_limit);
        }

        let pending = manager
            .send_transaction(tx)
            .await
            .map_err(|e| self.submission_error(e))?;
        let tx_hash = *pending.tx_hash();
        if !call.wait {
            return Ok(SubmittedTransaction {
                from,
                tx_hash,
                receipt: None,
            });
        }

        let watcher = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(Some(self.receipt_timeout));
        match watcher.get_receipt().await {
            Ok(receipt) => Ok(SubmittedTransaction {
                from,
                tx_hash,
                receipt: Some(receipt),
            }),
            Err(source) => {
                manager.reset();
                Err(ContractCallError::Receipt { tx_hash, source })
            }
        }
    }

    fn submission_error(&self, error: SubmissionError<TransportError>) -> ContractCallError {
        match error {
            SubmissionError::Signer(e) if self.classifier.is_nonce_conflict(&e) => {
                ContractCallError::NonceConflict(e)
            }
            SubmissionError::Signer(e) => ContractCallError::Transport(e),
            SubmissionError::Interrupted(e) => ContractCallError::Interrupted(e),
        }
    }

    /// A cursor over logs matching `filter` from `from_block` up to the current head.
    pub async fn logs(
        &self,
        filter: Filter,
        from_block: u64,
    ) -> TransportResult<LogCursor<RootProvider>> {
        LogCursor::new(self.reader.clone(), filter, from_block, self.log_window).await
    }

    /// All logs matching `filter` from `from_block` up to the current head.
    pub async fn pull_logs(&self, filter: Filter, from_block: u64) -> TransportResult<Vec<Log>> {
        self.logs(filter, from_block).await?.collect().await
    }
}

impl Drop for Eip155ChainProvider {
    fn drop(&mut self) {
        self.signer_cache.evict_connection(self.connection);
    }
}

/// Creates a provider registered in the [shared](SignerCache::shared) signer cache.
#[async_trait::async_trait]
impl FromConfig<Eip155ChainConfig> for Eip155ChainProvider {
    async fn from_config(config: &Eip155ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = Self::try_new(config, SignerCache::shared())?;
        Ok(provider)
    }
}

impl ChainProviderOps for Eip155ChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        self.signers.iter().map(|s| s.address().to_string()).collect()
    }

    fn chain_id(&self) -> ChainId {
        self.chain.into()
    }
}

/// A contract call to submit: target, calldata, and optional overrides.
#[derive(Debug, Clone, Default)]
pub struct ContractCall {
    /// Sender; a configured signer is picked when absent.
    pub from: Option<Address>,
    pub to: Address,
    pub calldata: Bytes,
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    /// Whether to wait for the receipt before returning.
    pub wait: bool,
}

/// A broadcast transaction, with its receipt if it was awaited.
#[derive(Debug, Clone)]
pub struct SubmittedTransaction {
    pub from: Address,
    pub tx_hash: B256,
    pub receipt: Option<TransactionReceipt>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContractCallError {
    #[error("Signer {0} is not configured for this chain")]
    UnknownSigner(Address),
    /// The node still reported a nonce conflict after one resynchronized retry.
    #[error("Nonce conflict persisted after resynchronization: {0}")]
    NonceConflict(TransportError),
    #[error(transparent)]
    Transport(TransportError),
    #[error(transparent)]
    Interrupted(QueueTaskError),
    #[error("Transaction {tx_hash} was broadcast but its receipt was not obtained: {source}")]
    Receipt {
        tx_hash: TxHash,
        source: PendingTransactionError,
    },
}

impl ContractCallError {
    /// Whether waiting for the receipt ran past the configured timeout.
    pub fn is_receipt_timeout(&self) -> bool {
        matches!(
            self,
            ContractCallError::Receipt {
                source: PendingTransactionError::TxWatcher(WatchTxError::Timeout),
                ..
            }
        )
    }
}
