//! Per-position serialization: "At most one `sync` may be in flight per
//! `(user, chain, protocol, nft_id)`." Implementations must hold a named
//! mutex keyed on that tuple for the duration of the sync; cross-position
//! operations proceed in parallel.
//!
//! A process-wide map from position identity to a lazily-created
//! `tokio::sync::Mutex<()>`, built on `rustc_hash::FxHashMap` for the hot-path
//! lookup; entries are never removed for the life of the process.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// The composite key a position is serialized on. `nft_id` is kept as a
/// string since NFT ids are u256 on
/// chain and this key only needs equality/hashing, not arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub user_id: String,
    pub chain: String,
    pub protocol: String,
    pub nft_id: String,
}

impl PositionKey {
    pub fn new(user_id: impl Into<String>, chain: impl Into<String>, protocol: impl Into<String>, nft_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), chain: chain.into(), protocol: protocol.into(), nft_id: nft_id.into() }
    }
}

/// Lazily-populated registry of per-position mutexes. A held guard must be
/// dropped (cancellation included — `tokio::sync::Mutex` releases on drop
/// even when the holding task is cancelled) before another `sync` for the
/// same position can proceed.
#[derive(Default)]
pub struct PositionLocks {
    locks: Mutex<FxHashMap<PositionKey, Arc<Mutex<()>>>>,
}

impl PositionLocks {
    pub fn new() -> Self {
        Self { locks: Mutex::new(FxHashMap::default()) }
    }

    async fn entry(&self, key: &PositionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquires the named mutex for `key`, blocking until any concurrent
    /// `sync`/`add_manual_event`/`hard_reset` for the same position
    /// releases it. The returned guard holds the lock for as long as it is
    /// kept alive; drop it (or let it fall out of scope) to release.
    pub async fn acquire(&self, key: &PositionKey) -> OwnedMutexGuard<()> {
        let mutex = self.entry(key).await;
        mutex.lock_owned().await
    }
}

/// A borrowed-guard variant for callers that already hold the `Arc<Mutex<()>>`
/// and only need scope-local exclusion (used by in-process tests that don't
/// want to juggle owned guards).
pub async fn lock_guard(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_position_key_serializes_through_one_mutex() {
        let locks = Arc::new(PositionLocks::new());
        let key = PositionKey::new("user-1", "ethereum", "uniswap-v3", "12345");

        let guard = locks.acquire(&key).await;
        let locks_clone = locks.clone();
        let key_clone = key.clone();
        let attempt = tokio::spawn(async move { locks_clone.acquire(&key_clone).await });

        tokio::task::yield_now().await;
        assert!(!attempt.is_finished());

        drop(guard);
        let _second_guard = attempt.await.unwrap();
    }

    #[tokio::test]
    async fn different_position_keys_do_not_contend() {
        let locks = PositionLocks::new();
        let a = PositionKey::new("user-1", "ethereum", "uniswap-v3", "1");
        let b = PositionKey::new("user-1", "ethereum", "uniswap-v3", "2");

        let guard_a = locks.acquire(&a).await;
        let guard_b = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(&b))
            .await
            .expect("acquiring a different position's lock must not block");

        drop(guard_a);
        drop(guard_b);
    }
}
