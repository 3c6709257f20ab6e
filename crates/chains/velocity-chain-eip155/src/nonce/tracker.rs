use alloy_primitives::Address;
use alloy_rpc_types_eth::TransactionRequest;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BlockTag, NonceManagedSigner, TransactionSigner};

/// Hands out nonces as `base + delta`.
///
/// `base` is the account's pending transaction count, fetched from the node
/// on first use and cached until [`reset`](NonceManagedSigner::reset). `delta`
/// counts the nonces handed out since. Nonces for [`BlockTag::Latest`] always
/// come straight from the node.
#[derive(Debug)]
pub struct NonceTrackingSigner<S> {
    signer: S,
    state: Mutex<NonceState>,
}

#[derive(Debug, Default)]
struct NonceState {
    base: Option<u64>,
    delta: u64,
}

impl<S> NonceTrackingSigner<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            state: Mutex::default(),
        }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    fn state(&self) -> MutexGuard<'_, NonceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: TransactionSigner> NonceManagedSigner for NonceTrackingSigner<S> {
    type Pending = S::Pending;
    type Error = S::Error;

    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn get_nonce(&self, tag: BlockTag) -> Result<u64, S::Error> {
        if tag == BlockTag::Latest {
            return self.signer.transaction_count(BlockTag::Latest).await;
        }
        let cached = self.state().base;
        let base = match cached {
            Some(base) => base,
            None => {
                let fetched = self.signer.transaction_count(BlockTag::Pending).await?;
                #[cfg(feature = "telemetry")]
                tracing::debug!(
                    address = %self.signer.address(),
                    nonce = fetched,
                    "Fetched pending nonce"
                );
                *self.state().base.get_or_insert(fetched)
            }
        };
        Ok(base + self.state().delta)
    }

    fn increment(&self) {
        self.state().delta += 1;
    }

    fn reset(&self) {
        let mut state = self.state();
        state.base = None;
        state.delta = 0;
        #[cfg(feature = "telemetry")]
        tracing::debug!(address = %self.signer.address(), "Reset local nonce state");
    }

    async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<S::Pending, S::Error> {
        let nonce = self.get_nonce(BlockTag::Pending).await?;
        self.increment();
        tx.nonce = Some(nonce);
        let mut populated = self.signer.populate_transaction(tx).await?;
        populated.nonce = Some(nonce);
        self.signer.send_transaction(populated).await
    }

    async fn populate_transaction(
        &self,
        tx: TransactionRequest,
    ) -> Result<TransactionRequest, S::Error> {
        self.signer.populate_transaction(tx).await
    }

    async fn send_populated_transaction(
        &self,
        tx: TransactionRequest,
    ) -> Result<S::Pending, S::Error> {
        self.signer.send_transaction(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::ErrorDetail;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Counts pending transactions like a node whose mempool accepts everything.
    #[derive(Default)]
    struct CountingSigner {
        pending: AtomicU64,
        count_calls: AtomicUsize,
        sent: Mutex<Vec<TransactionRequest>>,
    }

    impl TransactionSigner for CountingSigner {
        type Pending = u64;
        type Error = ErrorDetail;

        fn address(&self) -> Address {
            Address::repeat_byte(0x11)
        }

        async fn transaction_count(&self, _tag: BlockTag) -> Result<u64, ErrorDetail> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pending.load(Ordering::SeqCst))
        }

        async fn populate_transaction(
            &self,
            mut tx: TransactionRequest,
        ) -> Result<TransactionRequest, ErrorDetail> {
            tx.from = Some(self.address());
            tx.gas = Some(21_000);
            Ok(tx)
        }

        async fn send_transaction(&self, tx: TransactionRequest) -> Result<u64, ErrorDetail> {
            let nonce = tx.nonce.ok_or_else(|| ErrorDetail::new("missing nonce"))?;
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(tx);
            Ok(nonce)
        }
    }

    #[tokio::test]
    async fn test_nonces_are_assigned_locally_after_first_fetch() {
        let signer = CountingSigner::default();
        signer.pending.store(7, Ordering::SeqCst);
        let tracker = NonceTrackingSigner::new(signer);

        for expected in 7..10 {
            let nonce = tracker
                .send_transaction(TransactionRequest::default())
                .await
                .unwrap();
            assert_eq!(nonce, expected);
        }
        assert_eq!(tracker.signer().count_calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.get_nonce(BlockTag::Pending).await.unwrap(), 10);

        let sent = tracker.signer().sent.lock().unwrap().clone();
        assert!(sent.iter().all(|tx| tx.gas == Some(21_000)));
    }

    #[tokio::test]
    async fn test_increment_and_reset() {
        let signer = CountingSigner::default();
        signer.pending.store(3, Ordering::SeqCst);
        let tracker = NonceTrackingSigner::new(signer);

        assert_eq!(tracker.get_nonce(BlockTag::Pending).await.unwrap(), 3);
        tracker.increment();
        tracker.increment();
        assert_eq!(tracker.get_nonce(BlockTag::Pending).await.unwrap(), 5);

        // The node moved on without us.
        tracker.signer().pending.store(9, Ordering::SeqCst);
        assert_eq!(tracker.get_nonce(BlockTag::Pending).await.unwrap(), 5);
        tracker.reset();
        assert_eq!(tracker.get_nonce(BlockTag::Pending).await.unwrap(), 9);
        assert_eq!(tracker.signer().count_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_latest_is_never_cached() {
        let tracker = NonceTrackingSigner::new(CountingSigner::default());
        tracker.get_nonce(BlockTag::Latest).await.unwrap();
        tracker.get_nonce(BlockTag::Latest).await.unwrap();
        assert_eq!(tracker.signer().count_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_populated_nonce_is_the_assigned_one() {
        let tracker = NonceTrackingSigner::new(CountingSigner::default());
        let tx = TransactionRequest {
            nonce: Some(1_000),
            ..Default::default()
        };
        let nonce = tracker.send_transaction(tx).await.unwrap();
        assert_eq!(nonce, 0);
    }
}
