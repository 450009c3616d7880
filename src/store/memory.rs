//! In-memory visited store.

use async_trait::async_trait;
use dashmap::DashSet;

use super::{StoreError, VisitedStore};

/// Concurrent hash set of claimed dedup keys.
///
/// `DashSet::insert` locks the key's shard for the check and the insert, which
/// is what makes `mark_if_new` indivisible.
#[derive(Debug, Default)]
pub struct InMemoryVisitedStore {
    visited: DashSet<String>,
}

impl InMemoryVisitedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of claimed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

#[async_trait]
impl VisitedStore for InMemoryVisitedStore {
    async fn mark_if_new(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.visited.insert(hash.to_string()))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.visited.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_first_mark_wins_second_loses() {
        let store = InMemoryVisitedStore::new();
        assert!(store.mark_if_new("abc").await.unwrap());
        assert!(!store.mark_if_new("abc").await.unwrap());
        assert!(store.mark_if_new("def").await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_close_clears_and_is_idempotent() {
        let store = InMemoryVisitedStore::new();
        store.mark_if_new("abc").await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_empty());
        assert!(store.mark_if_new("abc").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_racing_claims_have_one_winner() {
        let store = Arc::new(InMemoryVisitedStore::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(32));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                if store.mark_if_new("same-page").await.unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
