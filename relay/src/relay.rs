//! Transaction submission behind the HTTP endpoints.
//!
//! [`TransactionRelay`] is the seam between the handlers and the chains.
//! [`RelayLocal`] implements it over a [`ChainRegistry`] of configured
//! providers: each request is routed by chain id, then submitted through the
//! cached nonce manager of its sender, so requests for the same signer are
//! broadcast in arrival order.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types_eth::TransactionReceipt;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use velocity_chain_eip155::chain::{ContractCall, ContractCallError};
use velocity_types::chain::{ChainId, ChainProviderOps, ChainRegistry};

use crate::chain::ChainProvider;

/// `POST /transactions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    pub chain: ChainId,
    /// Sender; a configured signer is picked round-robin when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Wait for the receipt before responding.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionResponse {
    pub chain: ChainId,
    pub from: Address,
    pub transaction_hash: TxHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceipt>,
}

/// `GET /signers` body: signer addresses per chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignersResponse {
    pub signers: HashMap<ChainId, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Submission failures, as reported to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Chain {0} is not configured")]
    UnsupportedChain(ChainId),
    #[error("Signer {signer} is not configured for chain {chain}")]
    UnknownSigner { chain: ChainId, signer: Address },
    #[error("Nonce conflict persisted after resynchronization: {0}")]
    NonceConflict(String),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Timed out waiting for the receipt of {0}")]
    ReceiptTimeout(TxHash),
    #[error("Receipt of {tx_hash} could not be obtained: {message}")]
    Receipt { tx_hash: TxHash, message: String },
    #[error("Submission was interrupted: {0}")]
    Interrupted(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_)
            | RelayError::UnsupportedChain(_)
            | RelayError::UnknownSigner { .. } => StatusCode::BAD_REQUEST,
            RelayError::NonceConflict(_) => StatusCode::CONFLICT,
            RelayError::Rpc(_) | RelayError::Receipt { .. } => StatusCode::BAD_GATEWAY,
            RelayError::ReceiptTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_contract_call(chain: ChainId, error: ContractCallError) -> Self {
        match error {
            ContractCallError::Receipt { tx_hash, .. } if error.is_receipt_timeout() => {
                RelayError::ReceiptTimeout(tx_hash)
            }
            ContractCallError::UnknownSigner(signer) => RelayError::UnknownSigner { chain, signer },
            ContractCallError::NonceConflict(e) => RelayError::NonceConflict(e.to_string()),
            ContractCallError::Transport(e) => RelayError::Rpc(e.to_string()),
            ContractCallError::Interrupted(e) => RelayError::Interrupted(e.to_string()),
            ContractCallError::Receipt { tx_hash, source } => RelayError::Receipt {
                tx_hash,
                message: source.to_string(),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Submits transactions and reports the signers available for them.
pub trait TransactionRelay {
    fn submit(
        &self,
        request: SubmitTransactionRequest,
    ) -> impl Future<Output = Result<SubmitTransactionResponse, RelayError>> + Send;

    fn signers(&self) -> impl Future<Output = SignersResponse> + Send;
}

impl<T: TransactionRelay + Send + Sync> TransactionRelay for Arc<T> {
    fn submit(
        &self,
        request: SubmitTransactionRequest,
    ) -> impl Future<Output = Result<SubmitTransactionResponse, RelayError>> + Send {
        self.as_ref().submit(request)
    }

    fn signers(&self) -> impl Future<Output = SignersResponse> + Send {
        self.as_ref().signers()
    }
}

/// Relays transactions through the providers of a [`ChainRegistry`].
#[derive(Debug)]
pub struct RelayLocal {
    chains: ChainRegistry<ChainProvider>,
}

impl RelayLocal {
    pub fn new(chains: ChainRegistry<ChainProvider>) -> Self {
        Self { chains }
    }
}

impl TransactionRelay for RelayLocal {
    async fn submit(
        &self,
        request: SubmitTransactionRequest,
    ) -> Result<SubmitTransactionResponse, RelayError> {
        let provider = self
            .chains
            .by_chain_id(&request.chain)
            .ok_or_else(|| RelayError::UnsupportedChain(request.chain.clone()))?;
        match provider {
            ChainProvider::Eip155(provider) => {
                let call = ContractCall {
                    from: request.from,
                    to: request.to,
                    calldata: request.data,
                    value: request.value,
                    gas_limit: request.gas_limit,
                    wait: request.wait,
                };
                let submitted = provider
                    .send_transaction(call)
                    .await
                    .map_err(|e| RelayError::from_contract_call(request.chain.clone(), e))?;
                Ok(SubmitTransactionResponse {
                    chain: request.chain,
                    from: submitted.from,
                    transaction_hash: submitted.tx_hash,
                    receipt: submitted.receipt,
                })
            }
        }
    }

    async fn signers(&self) -> SignersResponse {
        let signers = self
            .chains
            .iter()
            .map(|(chain_id, provider)| (chain_id.clone(), provider.signer_addresses()))
            .collect();
        SignersResponse { signers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use serde_json::json;
    use velocity_chain_eip155::chain::config::{Eip155ChainConfig, Eip155ChainConfigInner};
    use velocity_chain_eip155::chain::{Eip155ChainProvider, Eip155ChainReference};
    use velocity_chain_eip155::signer_cache::SignerCache;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn devnet() -> RelayLocal {
        let inner: Eip155ChainConfigInner = serde_json::from_value(json!({
            "signers": [DEV_KEY],
            "rpc": [{"http": "http://127.0.0.1:1"}],
        }))
        .unwrap();
        let config = Eip155ChainConfig {
            chain_reference: Eip155ChainReference::new(1337),
            inner,
        };
        let provider = Eip155ChainProvider::try_new(&config, Arc::new(SignerCache::new())).unwrap();
        let chains = [ChainProvider::Eip155(Arc::new(provider))]
            .into_iter()
            .collect();
        RelayLocal::new(chains)
    }

    fn request(chain: &str) -> SubmitTransactionRequest {
        serde_json::from_value(json!({
            "chain": chain,
            "to": "0x2222222222222222222222222222222222222222",
            "data": "0xdeadbeef",
        }))
        .unwrap()
    }

    #[test]
    fn test_request_uses_camel_case_and_defaults() {
        let request: SubmitTransactionRequest = serde_json::from_value(json!({
            "chain": "eip155:1337",
            "to": "0x2222222222222222222222222222222222222222",
            "gasLimit": 21000,
            "value": "0x10",
        }))
        .unwrap();
        assert_eq!(request.gas_limit, Some(21000));
        assert_eq!(request.value, Some(U256::from(16)));
        assert!(request.data.is_empty());
        assert!(request.from.is_none());
        assert!(!request.wait);
    }

    #[test]
    fn test_status_codes() {
        let chain: ChainId = "eip155:1337".parse().unwrap();
        let cases = [
            (RelayError::InvalidRequest("missing field `to`".into()), StatusCode::BAD_REQUEST),
            (RelayError::UnsupportedChain(chain.clone()), StatusCode::BAD_REQUEST),
            (
                RelayError::UnknownSigner {
                    chain,
                    signer: Address::ZERO,
                },
                StatusCode::BAD_REQUEST,
            ),
            (RelayError::NonceConflict("nonce too low".into()), StatusCode::CONFLICT),
            (RelayError::Rpc("connection refused".into()), StatusCode::BAD_GATEWAY),
            (RelayError::ReceiptTimeout(B256::ZERO), StatusCode::GATEWAY_TIMEOUT),
            (RelayError::Interrupted("panicked".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_receipt_failures_are_told_apart() {
        use alloy_provider::{PendingTransactionError, WatchTxError};

        let chain: ChainId = "eip155:1337".parse().unwrap();
        let tx_hash = B256::repeat_byte(0x11);
        let timed_out = ContractCallError::Receipt {
            tx_hash,
            source: PendingTransactionError::TxWatcher(WatchTxError::Timeout),
        };
        let error = RelayError::from_contract_call(chain.clone(), timed_out);
        assert!(matches!(error, RelayError::ReceiptTimeout(hash) if hash == tx_hash));
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let unregistered = ContractCallError::Receipt {
            tx_hash,
            source: PendingTransactionError::FailedToRegister,
        };
        let error = RelayError::from_contract_call(chain, unregistered);
        assert!(matches!(error, RelayError::Receipt { .. }));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unconfigured_chain_is_rejected() {
        let relay = devnet();
        let error = relay.submit(request("eip155:1")).await.unwrap_err();
        assert!(matches!(
            error,
            RelayError::UnsupportedChain(chain) if chain.to_string() == "eip155:1"
        ));
    }

    #[tokio::test]
    async fn test_unknown_sender_is_rejected() {
        let relay = devnet();
        let mut request = request("eip155:1337");
        request.from = Some(Address::repeat_byte(0x99));
        let error = relay.submit(request).await.unwrap_err();
        assert!(matches!(
            error,
            RelayError::UnknownSigner { signer, .. } if signer == Address::repeat_byte(0x99)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_gateway_error() {
        let relay = devnet();
        let error = relay.submit(request("eip155:1337")).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_signers_are_listed_per_chain() {
        let relay = devnet();
        let response = relay.signers().await;
        let chain: ChainId = "eip155:1337".parse().unwrap();
        assert_eq!(response.signers.get(&chain), Some(&vec![DEV_ADDRESS.to_string()]));
    }
}
