use super::{
    AuctionField, BidCommit, Filter, LotField, Query, RecordStore, StoreError, StoreResult,
};
use crate::auction::model::{
    Auction, AuctionId, AuctionPatch, Bid, Lot, LotId, LotPatch, NewBid,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Bounds every call of the wrapped store by a fixed deadline.
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: RecordStore> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        time::timeout(self.limit, call)
            .await
            .map_err(|_| StoreError::Timeout { operation })?
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TimeoutStore<S> {
    async fn read_auctions(&self, query: Query<AuctionField>) -> StoreResult<Vec<Auction>> {
        self.bounded("read_auctions", self.inner.read_auctions(query))
            .await
    }

    async fn read_auction(&self, id: AuctionId) -> StoreResult<Auction> {
        self.bounded("read_auction", self.inner.read_auction(id)).await
    }

    async fn update_auction(&self, id: AuctionId, patch: AuctionPatch) -> StoreResult<Auction> {
        self.bounded("update_auction", self.inner.update_auction(id, patch))
            .await
    }

    async fn read_lots(&self, query: Query<LotField>) -> StoreResult<Vec<Lot>> {
        self.bounded("read_lots", self.inner.read_lots(query)).await
    }

    async fn read_lot(&self, id: LotId) -> StoreResult<Lot> {
        self.bounded("read_lot", self.inner.read_lot(id)).await
    }

    async fn update_lot(&self, id: LotId, patch: LotPatch) -> StoreResult<Lot> {
        self.bounded("update_lot", self.inner.update_lot(id, patch))
            .await
    }

    async fn count_lots(&self, filter: Filter<LotField>) -> StoreResult<i64> {
        self.bounded("count_lots", self.inner.count_lots(filter))
            .await
    }

    async fn create_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        self.bounded("create_bid", self.inner.create_bid(bid)).await
    }

    async fn commit_bid(&self, commit: BidCommit) -> StoreResult<Bid> {
        self.bounded("commit_bid", self.inner.commit_bid(commit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    struct StalledStore;

    #[async_trait]
    impl RecordStore for StalledStore {
        async fn read_auctions(&self, _: Query<AuctionField>) -> StoreResult<Vec<Auction>> {
            std::future::pending().await
        }
        async fn read_auction(&self, _: AuctionId) -> StoreResult<Auction> {
            std::future::pending().await
        }
        async fn update_auction(&self, _: AuctionId, _: AuctionPatch) -> StoreResult<Auction> {
            std::future::pending().await
        }
        async fn read_lots(&self, _: Query<LotField>) -> StoreResult<Vec<Lot>> {
            std::future::pending().await
        }
        async fn read_lot(&self, _: LotId) -> StoreResult<Lot> {
            std::future::pending().await
        }
        async fn update_lot(&self, _: LotId, _: LotPatch) -> StoreResult<Lot> {
            std::future::pending().await
        }
        async fn count_lots(&self, _: Filter<LotField>) -> StoreResult<i64> {
            std::future::pending().await
        }
        async fn create_bid(&self, _: NewBid) -> StoreResult<Bid> {
            std::future::pending().await
        }
        async fn commit_bid(&self, _: BidCommit) -> StoreResult<Bid> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_call_fails_with_timeout() {
        let store = TimeoutStore::new(StalledStore, Duration::from_millis(20));
        let result = store.read_auction(1).await;
        assert_eq!(
            result,
            Err(StoreError::Timeout {
                operation: "read_auction"
            })
        );
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let store = TimeoutStore::new(MemoryRecordStore::new(), Duration::from_secs(5));
        assert!(matches!(
            store.read_lot(9).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
