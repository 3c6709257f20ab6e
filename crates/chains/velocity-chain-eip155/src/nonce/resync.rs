use alloy_primitives::Address;
use alloy_rpc_types_eth::TransactionRequest;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use super::{BlockTag, NonceConflictClassifier, NonceManagedSigner};
use crate::queue::{QueueTaskError, SequentialQueue, TaskHandle};

/// Serializes submissions for one account and recovers from stale nonces.
///
/// Every [`send_transaction`](Self::send_transaction) call is queued behind the
/// previous one, so at most one submission per account is in flight. A
/// submission first goes through the wrapped signer's own nonce assignment.
/// If that fails the local nonce state is reset; when the failure is a nonce
/// conflict the transaction is retried exactly once with a nonce fetched from
/// the node's pending state. A failed retry resets the state again.
#[derive(Debug)]
pub struct ResyncingNonceManager<M> {
    inner: Arc<M>,
    queue: SequentialQueue,
    classifier: Arc<NonceConflictClassifier>,
}

/// Why a queued submission failed.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError<E> {
    /// The signer or the node rejected the transaction.
    #[error(transparent)]
    Signer(E),
    /// The submission task ended without producing a result.
    #[error(transparent)]
    Interrupted(#[from] QueueTaskError),
}

impl<M: NonceManagedSigner> ResyncingNonceManager<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner: Arc::new(inner),
            queue: SequentialQueue::new(),
            classifier: Arc::new(NonceConflictClassifier::default()),
        }
    }

    /// Replaces the default nonce-conflict rules.
    pub fn with_classifier(mut self, classifier: Arc<NonceConflictClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn classifier(&self) -> &NonceConflictClassifier {
        &self.classifier
    }

    /// Queues `tx` for submission.
    ///
    /// The submission is scheduled immediately; awaiting the returned future
    /// only observes its outcome.
    pub fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> PendingSubmission<M::Pending, M::Error> {
        let inner = Arc::clone(&self.inner);
        let classifier = Arc::clone(&self.classifier);
        PendingSubmission(self.queue.enqueue(move || submit_with_resync(inner, classifier, tx)))
    }

    /// Queues a reset of the local nonce state.
    ///
    /// The reset runs after every submission queued before it and before any
    /// queued after it.
    pub fn reset(&self) -> TaskHandle<()> {
        let inner = Arc::clone(&self.inner);
        self.queue.enqueue(move || async move { inner.reset() })
    }
}

/// Outcome of a queued submission. See [`ResyncingNonceManager::send_transaction`].
#[derive(Debug)]
pub struct PendingSubmission<P, E>(TaskHandle<Result<P, E>>);

impl<P, E> Future for PendingSubmission<P, E> {
    type Output = Result<P, SubmissionError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.0).poll(cx));
        Poll::Ready(match outcome {
            Ok(result) => result.map_err(SubmissionError::Signer),
            Err(interrupted) => Err(SubmissionError::Interrupted(interrupted)),
        })
    }
}

async fn submit_with_resync<M: NonceManagedSigner>(
    inner: Arc<M>,
    classifier: Arc<NonceConflictClassifier>,
    tx: TransactionRequest,
) -> Result<M::Pending, M::Error> {
    let error = match inner.send_transaction(tx.clone()).await {
        Ok(pending) => return Ok(pending),
        Err(error) => error,
    };
    inner.reset();
    if !classifier.is_nonce_conflict(&error) {
        return Err(error);
    }
    #[cfg(feature = "telemetry")]
    tracing::warn!(
        address = %inner.address(),
        error = %error,
        "Nonce conflict, retrying with resynchronized nonce"
    );
    drop(error);

    let retried = submit_with_explicit_nonce(inner.as_ref(), tx).await;
    if retried.is_err() {
        inner.reset();
    }
    retried
}

async fn submit_with_explicit_nonce<M: NonceManagedSigner>(
    inner: &M,
    mut tx: TransactionRequest,
) -> Result<M::Pending, M::Error> {
    let nonce = inner.get_nonce(BlockTag::Pending).await?;
    inner.increment();
    tx.nonce = Some(nonce);
    let mut populated = inner.populate_transaction(tx).await?;
    populated.nonce = Some(nonce);
    inner.send_populated_transaction(populated).await
}
