use super::model::{AuctionId, LotId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// 경매 상태 변경 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AuctionEvent {
    // 입찰 이벤트
    BidPlaced {
        auction_id: AuctionId,
        lot_id: LotId,
        bidder_id: UserId,
        bid_amount: i64,
        stc: bool,
        timestamp: DateTime<Utc>,
    },
    // 타임드 경매 종료 시간 연장
    AuctionExtended {
        auction_id: AuctionId,
        end_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    AuctionActivated {
        auction_id: AuctionId,
        lot_id: LotId,
        timestamp: DateTime<Utc>,
    },
    LotStarted {
        auction_id: AuctionId,
        lot_id: LotId,
        lot_end_time: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    IntermissionStarted {
        auction_id: AuctionId,
        next_lot_id: LotId,
        next_lot_start_time: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    LotCompleted {
        auction_id: AuctionId,
        lot_id: LotId,
        timestamp: DateTime<Utc>,
    },
    AuctionCompleted {
        auction_id: AuctionId,
        timestamp: DateTime<Utc>,
    },
    // 진행 가능한 로트가 없는 경매
    AuctionFailed {
        auction_id: AuctionId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    InactivityIncreased {
        auction_id: AuctionId,
        inactivity_periods: i32,
        timestamp: DateTime<Utc>,
    },
}

impl AuctionEvent {
    pub fn auction_id(&self) -> AuctionId {
        match self {
            AuctionEvent::BidPlaced { auction_id, .. }
            | AuctionEvent::AuctionExtended { auction_id, .. }
            | AuctionEvent::AuctionActivated { auction_id, .. }
            | AuctionEvent::LotStarted { auction_id, .. }
            | AuctionEvent::IntermissionStarted { auction_id, .. }
            | AuctionEvent::LotCompleted { auction_id, .. }
            | AuctionEvent::AuctionCompleted { auction_id, .. }
            | AuctionEvent::AuctionFailed { auction_id, .. }
            | AuctionEvent::InactivityIncreased { auction_id, .. } => *auction_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AuctionEvent::BidPlaced { .. } => "BidPlaced",
            AuctionEvent::AuctionExtended { .. } => "AuctionExtended",
            AuctionEvent::AuctionActivated { .. } => "AuctionActivated",
            AuctionEvent::LotStarted { .. } => "LotStarted",
            AuctionEvent::IntermissionStarted { .. } => "IntermissionStarted",
            AuctionEvent::LotCompleted { .. } => "LotCompleted",
            AuctionEvent::AuctionCompleted { .. } => "AuctionCompleted",
            AuctionEvent::AuctionFailed { .. } => "AuctionFailed",
            AuctionEvent::InactivityIncreased { .. } => "InactivityIncreased",
        }
    }
}

// region:    --- Event Publisher Trait
/// 이벤트 발행 트레이트
///
/// Called after the owning write has been committed; a failure here never
/// undoes that write.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: AuctionEvent) -> Result<(), String>;
}

/// 브로커 없이 로그로만 남기는 발행자
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: AuctionEvent) -> Result<(), String> {
        debug!(
            "{:<12} --> {} auction={}: {:?}",
            "Event",
            event.event_type(),
            event.auction_id(),
            event
        );
        Ok(())
    }
}

/// 메모리에 이벤트를 쌓아두는 발행자 (테스트용)
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<AuctionEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuctionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: AuctionEvent) -> Result<(), String> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }
}
// endregion: --- Event Publisher Trait
