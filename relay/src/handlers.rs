//! HTTP endpoints of the relay.
//!
//! - `GET /health` - liveness probe
//! - `GET /signers` - configured signer addresses, per chain
//! - `POST /transactions` - submit a transaction through the sender's nonce manager
//!
//! Failures are answered with `{"error": "..."}` and a status code derived
//! from [`RelayError::status_code`].

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::relay::{RelayError, SubmitTransactionRequest, TransactionRelay};

/// Routes of the relay, to be given state with [`Router::with_state`].
pub fn routes<R>() -> Router<Arc<R>>
where
    R: TransactionRelay + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(get_health))
        .route("/signers", get(get_signers::<R>))
        .route("/transactions", post(post_transactions::<R>))
}

/// `GET /health`
#[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /signers`: addresses that can be passed as `from` in `POST /transactions`.
#[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
pub async fn get_signers<R>(State(relay): State<Arc<R>>) -> impl IntoResponse
where
    R: TransactionRelay + Send + Sync + 'static,
{
    Json(relay.signers().await)
}

/// `POST /transactions`
///
/// Transactions from the same signer are broadcast in the order their
/// requests arrive. With `"wait": true` the response carries the receipt.
#[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
pub async fn post_transactions<R>(
    State(relay): State<Arc<R>>,
    body: Result<Json<SubmitTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RelayError>
where
    R: TransactionRelay + Send + Sync + 'static,
{
    let Json(body) =
        body.map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))?;
    #[cfg(feature = "telemetry")]
    tracing::debug!(chain = %body.chain, to = %body.to, "Submitting transaction");
    match relay.submit(body).await {
        Ok(response) => {
            #[cfg(feature = "telemetry")]
            tracing::info!(
                from = %response.from,
                tx = %response.transaction_hash,
                "Transaction submitted"
            );
            Ok((StatusCode::OK, Json(response)))
        }
        Err(error) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(%error, "Submission failed");
            Err(error)
        }
    }
}
