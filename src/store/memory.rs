//! In-process record store.
//!
//! Fully honours the store contract (filters, sort, limit, versioned
//! auction writes) and is what the engine tests run against.
use super::{
    AuctionField, BidCommit, Collection, Filter, LotField, Query, RecordStore, StoreError,
    StoreResult,
};
use crate::auction::model::{
    Auction, AuctionId, AuctionPatch, Bid, Lot, LotId, LotPatch, NewBid,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    auctions: BTreeMap<AuctionId, Auction>,
    lots: BTreeMap<LotId, Lot>,
    bids: Vec<Bid>,
    next_id: i64,
    failing_auctions: HashSet<AuctionId>,
    failing_lots: HashMap<LotId, u32>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Everything that can make an auction write fail, checked up front.
    fn check_auction_write(&self, id: AuctionId, patch: &AuctionPatch) -> StoreResult<()> {
        if self.failing_auctions.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for auction {id}"
            )));
        }
        let auction = self.auctions.get(&id).ok_or(StoreError::NotFound {
            collection: Collection::Auctions,
            id,
        })?;
        match patch.if_version {
            Some(expected) if auction.version != expected => Err(StoreError::Conflict {
                collection: Collection::Auctions,
                id,
            }),
            _ => Ok(()),
        }
    }

    fn check_lot_write(&mut self, id: LotId) -> StoreResult<()> {
        if !self.lots.contains_key(&id) {
            return Err(StoreError::NotFound {
                collection: Collection::Lots,
                id,
            });
        }
        match self.failing_lots.get_mut(&id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StoreError::Unavailable(format!("injected failure for lot {id}")))
            }
            _ => Ok(()),
        }
    }

    fn push_bid(&mut self, bid: NewBid) -> Bid {
        let bid = Bid {
            id: self.next_id(),
            lot: bid.lot,
            user: bid.user,
            amount: bid.amount,
            created_at: bid.created_at,
        };
        self.bids.push(bid.clone());
        bid
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an auction, assigning a fresh id.
    pub fn insert_auction(&self, mut auction: Auction) -> Auction {
        let mut tables = self.tables();
        auction.id = tables.next_id();
        tables.auctions.insert(auction.id, auction.clone());
        auction
    }

    /// Insert a lot, assigning a fresh id.
    pub fn insert_lot(&self, mut lot: Lot) -> Lot {
        let mut tables = self.tables();
        lot.id = tables.next_id();
        tables.lots.insert(lot.id, lot.clone());
        lot
    }

    pub fn auction(&self, id: AuctionId) -> Option<Auction> {
        self.tables().auctions.get(&id).cloned()
    }

    pub fn lot(&self, id: LotId) -> Option<Lot> {
        self.tables().lots.get(&id).cloned()
    }

    pub fn bids_for_lot(&self, lot: LotId) -> Vec<Bid> {
        self.tables()
            .bids
            .iter()
            .filter(|b| b.lot == lot)
            .cloned()
            .collect()
    }

    /// Make every update of this auction fail as if the store were down.
    pub fn fail_updates_for(&self, id: AuctionId) {
        self.tables().failing_auctions.insert(id);
    }

    /// Make the next `times` writes of this lot fail, then recover.
    pub fn fail_lot_writes(&self, id: LotId, times: u32) {
        self.tables().failing_lots.insert(id, times);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read_auctions(&self, query: Query<AuctionField>) -> StoreResult<Vec<Auction>> {
        let tables = self.tables();
        Ok(query.apply(tables.auctions.values().cloned()))
    }

    async fn read_auction(&self, id: AuctionId) -> StoreResult<Auction> {
        self.tables()
            .auctions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                collection: Collection::Auctions,
                id,
            })
    }

    async fn update_auction(&self, id: AuctionId, patch: AuctionPatch) -> StoreResult<Auction> {
        let mut tables = self.tables();
        tables.check_auction_write(id, &patch)?;
        let auction = tables.auctions.get_mut(&id).ok_or(StoreError::NotFound {
            collection: Collection::Auctions,
            id,
        })?;
        patch.apply(auction);
        Ok(auction.clone())
    }

    async fn read_lots(&self, query: Query<LotField>) -> StoreResult<Vec<Lot>> {
        let tables = self.tables();
        Ok(query.apply(tables.lots.values().cloned()))
    }

    async fn read_lot(&self, id: LotId) -> StoreResult<Lot> {
        self.tables()
            .lots
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                collection: Collection::Lots,
                id,
            })
    }

    async fn update_lot(&self, id: LotId, patch: LotPatch) -> StoreResult<Lot> {
        let mut tables = self.tables();
        tables.check_lot_write(id)?;
        let lot = tables.lots.get_mut(&id).ok_or(StoreError::NotFound {
            collection: Collection::Lots,
            id,
        })?;
        patch.apply(lot);
        Ok(lot.clone())
    }

    async fn count_lots(&self, filter: Filter<LotField>) -> StoreResult<i64> {
        let tables = self.tables();
        Ok(tables.lots.values().filter(|l| filter.matches(*l)).count() as i64)
    }

    async fn create_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        let mut tables = self.tables();
        if !tables.lots.contains_key(&bid.lot) {
            return Err(StoreError::NotFound {
                collection: Collection::Lots,
                id: bid.lot,
            });
        }
        Ok(tables.push_bid(bid))
    }

    async fn commit_bid(&self, commit: BidCommit) -> StoreResult<Bid> {
        // 테이블 잠금 하나로 검사 후 적용: 중간 실패 없음
        let mut tables = self.tables();
        tables.check_auction_write(commit.auction_id, &commit.auction)?;
        tables.check_lot_write(commit.bid.lot)?;

        if let Some(auction) = tables.auctions.get_mut(&commit.auction_id) {
            commit.auction.apply(auction);
        }
        if let Some(lot) = tables.lots.get_mut(&commit.bid.lot) {
            commit.lot.apply(lot);
        }
        Ok(tables.push_bid(commit.bid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{AuctionStatus, AuctionType};
    use chrono::Utc;

    #[tokio::test]
    async fn versioned_update_rejects_stale_writer() {
        let store = MemoryRecordStore::new();
        let auction = store.insert_auction(Auction::new(AuctionType::Live, Utc::now()));

        let first = store
            .update_auction(
                auction.id,
                AuctionPatch::new()
                    .status(AuctionStatus::Active)
                    .if_version(auction.version),
            )
            .await
            .unwrap();
        assert_eq!(first.version, auction.version + 1);

        let stale = store
            .update_auction(
                auction.id,
                AuctionPatch::new()
                    .status(AuctionStatus::Error)
                    .if_version(auction.version),
            )
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
        assert_eq!(store.auction(auction.id).unwrap().status, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let result = store.update_lot(42, LotPatch::default()).await;
        assert_eq!(
            result,
            Err(StoreError::NotFound {
                collection: Collection::Lots,
                id: 42
            })
        );
    }

    #[tokio::test]
    async fn failed_bid_commit_writes_nothing() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();
        let auction = store.insert_auction(Auction::new(AuctionType::Live, now));
        let lot = store.insert_lot(Lot::new(auction.id, now));
        let commit = BidCommit {
            auction_id: auction.id,
            auction: AuctionPatch {
                inactivity_periods: Some(0),
                last_activity_time: Some(now),
                ..AuctionPatch::new()
            }
            .if_version(auction.version),
            bid: NewBid {
                lot: lot.id,
                user: "user-1".to_string(),
                amount: 1100,
                created_at: now,
            },
            lot: LotPatch {
                current_bid: Some(1100),
                ..LotPatch::default()
            },
        };

        store.fail_lot_writes(lot.id, 1);
        let result = store.commit_bid(commit.clone()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.auction(auction.id).unwrap(), auction);
        assert_eq!(store.lot(lot.id).unwrap().current_bid, None);
        assert!(store.bids_for_lot(lot.id).is_empty());

        // 주입된 실패는 한 번뿐
        let bid = store.commit_bid(commit).await.unwrap();
        assert_eq!(bid.amount, 1100);
        assert_eq!(store.auction(auction.id).unwrap().version, auction.version + 1);
        assert_eq!(store.lot(lot.id).unwrap().current_bid, Some(1100));
    }

    #[tokio::test]
    async fn stale_bid_commit_is_a_conflict() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();
        let auction = store.insert_auction(Auction::new(AuctionType::Live, now));
        let lot = store.insert_lot(Lot::new(auction.id, now));
        let commit = BidCommit {
            auction_id: auction.id,
            auction: AuctionPatch::new().if_version(auction.version + 1),
            bid: NewBid {
                lot: lot.id,
                user: "user-1".to_string(),
                amount: 1100,
                created_at: now,
            },
            lot: LotPatch::default(),
        };
        assert!(matches!(
            store.commit_bid(commit).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(store.bids_for_lot(lot.id).is_empty());
    }

    #[tokio::test]
    async fn count_uses_the_same_filter_semantics_as_reads() {
        let store = MemoryRecordStore::new();
        let auction = store.insert_auction(Auction::new(AuctionType::Live, Utc::now()));
        for _ in 0..3 {
            store.insert_lot(Lot::new(auction.id, Utc::now()));
        }
        store.insert_lot(Lot::new(auction.id + 100, Utc::now()));

        let filter = Filter::new().eq(LotField::Auction, auction.id);
        assert_eq!(store.count_lots(filter.clone()).await.unwrap(), 3);
        assert_eq!(store.read_lots(Query::new(filter)).await.unwrap().len(), 3);
    }
}
