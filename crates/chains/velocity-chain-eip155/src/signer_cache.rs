//! Sharing nonce managers between callers that use the same account.
//!
//! Two independently created signers for the same key must not assign nonces
//! separately, or they would race each other for the same nonce. The
//! [`SignerCache`] hands out one [`ResyncingNonceManager`] per
//! `(connection, signer identity)` pair.
//!
//! A *connection* is one RPC provider instance. Managers created for
//! different connections never share state, and all managers of a connection
//! are evicted together when it goes away. Signers created without a
//! connection share the [`ConnectionScope::Detached`] scope.

use alloy_primitives::Address;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::nonce::{NonceTrackingSigner, ResyncingNonceManager, TransactionSigner};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one RPC provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// A process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// Where a cached manager lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionScope {
    Connection(ConnectionId),
    /// Signers not bound to any provider instance.
    Detached,
}

impl From<ConnectionId> for ConnectionScope {
    fn from(connection: ConnectionId) -> Self {
        ConnectionScope::Connection(connection)
    }
}

/// How a signer is recognized across instances.
pub trait SignerIdentity {
    fn address(&self) -> Address;

    /// Uncompressed public key, hex encoded, when the signer can produce one.
    fn public_key(&self) -> Option<String> {
        None
    }
}

/// Cache key of a signer: its public key if known, otherwise its address,
/// lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignerKey(String);

impl SignerKey {
    pub fn of<S: SignerIdentity + ?Sized>(signer: &S) -> Self {
        let identity = signer
            .public_key()
            .unwrap_or_else(|| signer.address().to_string());
        Self(identity.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type ScopeSigners<M> = Arc<DashMap<SignerKey, Arc<M>>>;

/// Nonce managers keyed by connection, then by signer.
pub struct SignerCache<M> {
    scopes: DashMap<ConnectionScope, ScopeSigners<M>>,
}

impl<M> SignerCache<M> {
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
        }
    }

    fn scope(&self, scope: ConnectionScope) -> ScopeSigners<M> {
        // Clone the Arc so no shard lock is held while the inner map is used.
        let signers = self.scopes.entry(scope).or_default();
        Arc::clone(signers.value())
    }

    /// Returns the manager cached under `key`, creating it with `create` if absent.
    ///
    /// `create` runs at most once per key and scope.
    pub fn get_or_create<F>(&self, scope: ConnectionScope, key: SignerKey, create: F) -> Arc<M>
    where
        F: FnOnce() -> M,
    {
        let signers = self.scope(scope);
        let manager = signers.entry(key).or_insert_with(|| Arc::new(create()));
        Arc::clone(manager.value())
    }

    pub fn get(&self, scope: ConnectionScope, key: &SignerKey) -> Option<Arc<M>> {
        let signers = self.scopes.get(&scope).map(|entry| Arc::clone(entry.value()))?;
        let manager = signers.get(key)?;
        Some(Arc::clone(manager.value()))
    }

    pub fn evict(&self, scope: ConnectionScope, key: &SignerKey) -> Option<Arc<M>> {
        let signers = self.scopes.get(&scope).map(|entry| Arc::clone(entry.value()))?;
        signers.remove(key).map(|(_, manager)| manager)
    }

    /// Drops every manager created for `connection`. Returns how many were cached.
    pub fn evict_connection(&self, connection: ConnectionId) -> usize {
        let evicted = self
            .scopes
            .remove(&ConnectionScope::Connection(connection))
            .map(|(_, signers)| signers.len())
            .unwrap_or_default();
        #[cfg(feature = "telemetry")]
        tracing::debug!(%connection, evicted, "Evicted cached signers");
        evicted
    }

    /// Number of cached managers across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> SignerCache<ResyncingNonceManager<NonceTrackingSigner<S>>>
where
    S: TransactionSigner + SignerIdentity,
{
    /// Returns the cached manager for `signer`'s identity, or wraps `signer` in a
    /// new one. A cache hit ignores `signer`.
    pub fn get_or_create_signer(
        &self,
        scope: ConnectionScope,
        signer: S,
    ) -> Arc<ResyncingNonceManager<NonceTrackingSigner<S>>> {
        let key = SignerKey::of(&signer);
        self.get_or_create(scope, key, || {
            ResyncingNonceManager::new(NonceTrackingSigner::new(signer))
        })
    }
}

impl<M> Default for SignerCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for SignerCache<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerCache")
            .field("scopes", &self.scopes.len())
            .field("signers", &self.len())
            .finish()
    }
}
