#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use live_auction_service::auction::events::{AuctionEvent, EventPublisher, MemoryPublisher};
use live_auction_service::auction::model::{
    Auction, AuctionId, AuctionPatch, AuctionStatus, AuctionType, IncrementSchedule, Lot, LotId,
    LotPatch, LotStatus,
};
use live_auction_service::bidding::PlaceBidCommand;
use live_auction_service::config::EngineConfig;
use live_auction_service::context::{EngineContext, ManualClock};
use live_auction_service::store::{MemoryRecordStore, RecordStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// 테스트 공용 환경 (메모리 저장소 + 수동 시계)
pub struct Fixture {
    pub store: Arc<MemoryRecordStore>,
    pub publisher: Arc<MemoryPublisher>,
    pub clock: Arc<ManualClock>,
    pub ctx: EngineContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let ctx = EngineContext::new(store.clone(), publisher.clone(), config)
            .with_clock(clock.clone());
        Self {
            store,
            publisher,
            clock,
            ctx,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    pub fn auction(&self, id: AuctionId) -> Auction {
        self.store.auction(id).expect("auction exists")
    }

    pub fn lot(&self, id: LotId) -> Lot {
        self.store.lot(id).expect("lot exists")
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.publisher
            .events()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    /// 경매 생성 (scheduled)
    pub fn insert_auction(&self, auction_type: AuctionType) -> Auction {
        let mut auction = Auction::new(auction_type, self.now() - Duration::hours(1));
        auction.start_date = Some(self.now() - Duration::seconds(1));
        self.store.insert_auction(auction)
    }

    /// 시작가 1000, 입찰 단위 100인 상품 생성
    pub fn insert_lot(&self, auction_id: AuctionId) -> Lot {
        self.insert_lot_with(auction_id, |_| {})
    }

    pub fn insert_lot_with(&self, auction_id: AuctionId, edit: impl FnOnce(&mut Lot)) -> Lot {
        let mut lot = Lot::new(auction_id, self.now() - Duration::minutes(30));
        lot.starting_price = Some(1000);
        lot.reserve_price = Some(0);
        lot.increments = IncrementSchedule {
            increment_amount: Some(100),
            ..IncrementSchedule::default()
        };
        edit(&mut lot);
        self.store.insert_lot(lot)
    }

    pub async fn patch_auction(&self, id: AuctionId, patch: AuctionPatch) -> Auction {
        self.store.update_auction(id, patch).await.unwrap()
    }

    pub async fn set_lot_status(&self, id: LotId, status: LotStatus) {
        self.store
            .update_lot(id, LotPatch::status(status))
            .await
            .unwrap();
    }

    /// 진행중인 라이브 경매와 현재 상품
    pub async fn running_live_auction(&self) -> (Auction, Lot) {
        let auction = self.insert_auction(AuctionType::Live);
        let lot = self.insert_lot(auction.id);
        self.set_lot_status(lot.id, LotStatus::Ongoing).await;
        let auction = self
            .patch_auction(
                auction.id,
                AuctionPatch {
                    current_lot: Some(Some(lot.id)),
                    current_lot_end_time: Some(Some(self.now() + Duration::seconds(30))),
                    last_activity_time: Some(self.now()),
                    ..AuctionPatch::new()
                }
                .status(AuctionStatus::Active),
            )
            .await;
        (auction, self.lot(lot.id))
    }

    /// 진행중인 타임드 경매 (종료까지 `remaining`)
    pub async fn running_timed_auction(&self, remaining: Option<Duration>) -> (Auction, Lot) {
        let mut auction = Auction::new(AuctionType::TimedAuction, self.now() - Duration::hours(1));
        auction.status = AuctionStatus::Active;
        auction.start_date = Some(self.now() - Duration::hours(1));
        auction.end_date = remaining.map(|r| self.now() + r);
        let auction = self.store.insert_auction(auction);
        let lot = self.insert_lot(auction.id);
        (auction, lot)
    }

    pub fn bid(&self, lot_id: LotId, amount: i64) -> PlaceBidCommand {
        self.bid_as(lot_id, amount, "user-1")
    }

    pub fn bid_as(&self, lot_id: LotId, amount: i64, bidder: &str) -> PlaceBidCommand {
        PlaceBidCommand {
            lot_id,
            bid_amount: amount,
            bidder_id: bidder.to_string(),
        }
    }
}

/// 첫 이벤트 발행에서 멈춰 `release`를 기다리는 발행자
#[derive(Default)]
pub struct GatedPublisher {
    pub entered: Notify,
    pub release: Notify,
    gated: AtomicBool,
}

#[async_trait]
impl EventPublisher for GatedPublisher {
    async fn publish(&self, _event: AuctionEvent) -> Result<(), String> {
        if !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

impl Fixture {
    /// 같은 저장소와 시계를 쓰되 이벤트는 `publisher`로 보내는 컨텍스트
    pub fn context_with(&self, publisher: Arc<dyn EventPublisher>, config: EngineConfig) -> EngineContext {
        EngineContext::new(self.store.clone(), publisher, config).with_clock(self.clock.clone())
    }
}
