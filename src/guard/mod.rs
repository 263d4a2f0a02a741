//! Per-auction serialization of read-modify-write cycles.
//!
//! Bids and lifecycle sweeps both mutate an auction and its current lot.
//! Every such cycle holds the auction's lock from its fresh read to its
//! last write.
// region:    --- Imports
use crate::auction::model::AuctionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time;
// endregion: --- Imports

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("timed out waiting for the lock of auction {auction_id}")]
pub struct GuardError {
    pub auction_id: AuctionId,
}

type AuctionLock = Arc<AsyncMutex<()>>;

/// 경매별 잠금 관리자
#[derive(Debug, Default, Clone)]
pub struct AuctionLocks {
    locks: Arc<Mutex<HashMap<AuctionId, AuctionLock>>>,
}

impl AuctionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, auction_id: AuctionId) -> AuctionLock {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(auction_id)
            .or_default()
            .clone()
    }

    /// Wait up to `wait` for exclusive access to one auction.
    pub async fn acquire(
        &self,
        auction_id: AuctionId,
        wait: Duration,
    ) -> Result<AuctionGuard, GuardError> {
        let lock = self.get_or_create(auction_id);
        match time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(AuctionGuard {
                auction_id,
                guard: Some(guard),
                locks: self.clone(),
            }),
            Err(_) => {
                self.remove_if_unused(auction_id);
                Err(GuardError { auction_id })
            }
        }
    }

    fn remove_if_unused(&self, auction_id: AuctionId) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(lock) = locks.get(&auction_id) {
            // Only the map itself still references it: no holder, no waiter.
            if Arc::strong_count(lock) == 1 {
                locks.remove(&auction_id);
            }
        }
    }

    /// Number of auctions with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Exclusive access to one auction, released on drop.
#[derive(Debug)]
pub struct AuctionGuard {
    auction_id: AuctionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: AuctionLocks,
}

impl AuctionGuard {
    pub fn auction_id(&self) -> AuctionId {
        self.auction_id
    }
}

impl Drop for AuctionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if_unused(self.auction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn cycles_on_one_auction_never_overlap() {
        let locks = AuctionLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(7, Duration::from_secs(5)).await.unwrap();
                let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now_inside, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_auctions_do_not_block_each_other() {
        let locks = AuctionLocks::new();
        let _first = locks.acquire(1, Duration::from_secs(1)).await.unwrap();
        let second = locks.acquire(2, Duration::from_millis(50)).await;
        assert!(second.is_ok());
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn waiting_past_the_deadline_fails() {
        let locks = AuctionLocks::new();
        let held = locks.acquire(3, Duration::from_secs(1)).await.unwrap();
        let waited = locks.acquire(3, Duration::from_millis(20)).await;
        assert_eq!(waited.unwrap_err(), GuardError { auction_id: 3 });

        drop(held);
        assert_eq!(locks.tracked(), 0);
        assert!(locks.acquire(3, Duration::from_millis(20)).await.is_ok());
    }
}
