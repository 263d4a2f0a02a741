/// 입찰 관련 커맨드 처리
/// 1. 입찰 (라이브 / 타임드)
/// 2. 다음 최소 입찰가 조회
// region:    --- Imports
use super::error::BidError;
use super::increment::{base_increment, required_increment, BidActivity};
use crate::auction::events::AuctionEvent;
use crate::auction::model::{
    positive, Auction, AuctionPatch, AuctionStatus, AuctionType, Lot, LotId, LotPatch, NewBid,
    UserId,
};
use crate::config::{span, EngineConfig};
use crate::context::EngineContext;
use crate::store::{BidCommit, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaceBidCommand {
    pub lot_id: LotId,
    pub bid_amount: i64,
    pub bidder_id: UserId,
}

/// 입찰 성공 결과
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BidReceipt {
    pub success: bool,
    pub message: String,
    pub lot_id: LotId,
    pub current_bid: i64,
    #[serde(rename = "STC")]
    pub stc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionInfo>,
}

/// 타임드 경매 종료 시간 정보
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtensionInfo {
    pub extended: bool,
    pub end_date: DateTime<Utc>,
}

/// 다음 최소 입찰가
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RequiredBid {
    pub lot_id: LotId,
    pub current_price: i64,
    pub increment: i64,
    pub required_bid: i64,
}

/// 1. 입찰
///
/// Serialized with every other writer of the same auction; within the lock
/// the lot and auction are re-read, validated and committed. A lost race on
/// the auction version re-runs the whole cycle. Events go out after the
/// lock is released.
pub async fn handle_place_bid(
    cmd: PlaceBidCommand,
    ctx: &EngineContext,
) -> Result<BidReceipt, BidError> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Bid", cmd);

    // 경매 id 확인용 조회 (잠금 후 다시 읽는다)
    let lot = ctx.store.read_lot(cmd.lot_id).await.map_err(|e| {
        log_failure(&cmd, &e);
        BidError::from(e)
    })?;
    let (receipt, events) = {
        let _guard = ctx.lock_auction(lot.auction).await.map_err(|e| {
            warn!("{:<12} --> 경매 잠금 대기 시간 초과: {}", "Bid", e);
            BidError::from(e)
        })?;
        place_with_retries(&cmd, ctx).await?
    };

    ctx.publish_all(events).await;
    Ok(receipt)
}

/// 2. 다음 최소 입찰가 조회
pub async fn get_required_bid(lot_id: LotId, ctx: &EngineContext) -> Result<RequiredBid, BidError> {
    let lot = ctx.store.read_lot(lot_id).await?;
    let auction = ctx.store.read_auction(lot.auction).await?;
    let increment = increment_for(&auction, &lot, &ctx.config);
    Ok(RequiredBid {
        lot_id,
        current_price: lot.current_price(),
        increment,
        required_bid: lot.current_price() + increment,
    })
}

// endregion: --- Commands

// region:    --- Bid Cycle
/// Receipt plus the events to publish once the lock is gone.
type BidOutcome = (BidReceipt, Vec<AuctionEvent>);

async fn place_with_retries(
    cmd: &PlaceBidCommand,
    ctx: &EngineContext,
) -> Result<BidOutcome, BidError> {
    let max_retries = ctx.config.max_write_retries;
    let mut retries = 0;
    while retries <= max_retries {
        match attempt_bid(cmd, ctx).await {
            Err(BidError::Store(StoreError::Conflict { .. })) => {
                warn!(
                    "{:<12} --> 낙관적 업데이트로 인한 버전 충돌: 재시도 lot={}",
                    "Bid", cmd.lot_id
                );
                retries += 1;
            }
            Err(e) => {
                if e.is_validation() {
                    info!("{:<12} --> 입찰 거절 lot={}: {}", "Bid", cmd.lot_id, e);
                } else {
                    error!("{:<12} --> 입찰 처리 오류 lot={}: {}", "Bid", cmd.lot_id, e);
                }
                return Err(e);
            }
            Ok(outcome) => return Ok(outcome),
        }
    }

    Err(BidError::MaxRetriesExceeded { attempts: retries })
}

async fn attempt_bid(cmd: &PlaceBidCommand, ctx: &EngineContext) -> Result<BidOutcome, BidError> {
    let lot = ctx.store.read_lot(cmd.lot_id).await?;
    let auction = match ctx.store.read_auction(lot.auction).await {
        Ok(auction) => auction,
        Err(StoreError::NotFound { .. }) => return Err(BidError::AuctionNotActive),
        Err(e) => return Err(e.into()),
    };
    let now = ctx.now();

    if auction.status != AuctionStatus::Active {
        return Err(BidError::AuctionNotActive);
    }

    match auction.auction_type {
        AuctionType::Live => place_live_bid(cmd, lot, auction, now, ctx).await,
        AuctionType::TimedAuction => place_timed_bid(cmd, lot, auction, now, ctx).await,
    }
}

async fn place_live_bid(
    cmd: &PlaceBidCommand,
    lot: Lot,
    auction: Auction,
    now: DateTime<Utc>,
    ctx: &EngineContext,
) -> Result<BidOutcome, BidError> {
    if auction.current_lot != Some(lot.id) || lot.is_concluded() {
        return Err(BidError::LotNotOpen);
    }

    let required = lot.current_price() + increment_for(&auction, &lot, &ctx.config);
    if cmd.bid_amount < required {
        return Err(BidError::BelowMinimum { required });
    }

    let (recent_bid_timestamps, activity_level) = next_activity(&auction, now, &ctx.config);
    let patch = AuctionPatch {
        inactivity_periods: Some(0),
        last_activity_time: Some(now),
        current_lot_end_time: Some(Some(now + span(ctx.config.base_timer_duration))),
        recent_bid_timestamps: Some(recent_bid_timestamps),
        activity_level: Some(activity_level),
        ..AuctionPatch::new()
    }
    .if_version(auction.version);
    let stc = stc_for(cmd, &lot);
    ctx.store
        .commit_bid(bid_commit(cmd, &lot, patch, stc, now))
        .await?;

    if activity_level > auction.activity_level {
        info!(
            "{:<12} --> 입찰 활동 증가 auction={} level={}",
            "Bid", auction.id, activity_level
        );
    }
    log_accepted(cmd, stc);

    let events = vec![bid_placed(cmd, &auction, stc, now)];
    Ok((receipt(cmd, &lot, stc, None), events))
}

async fn place_timed_bid(
    cmd: &PlaceBidCommand,
    lot: Lot,
    auction: Auction,
    now: DateTime<Utc>,
    ctx: &EngineContext,
) -> Result<BidOutcome, BidError> {
    let end_date = match auction.end_date {
        Some(end_date) if now <= end_date => end_date,
        _ => return Err(BidError::AuctionEnded),
    };
    if lot.is_concluded() {
        return Err(BidError::LotNotOpen);
    }

    let required = lot.current_price() + increment_for(&auction, &lot, &ctx.config);
    if cmd.bid_amount < required {
        return Err(BidError::BelowMinimum { required });
    }

    // 마감 직전 입찰은 종료 시간을 연장한다 (anti-snipe)
    let window = extension_window(&auction, &ctx.config);
    let new_end_date = if end_date - now < window {
        now.checked_add_signed(window)
    } else {
        None
    };

    // 연장이 없어도 버전은 올려서 동시 입찰을 직렬화한다
    let patch = AuctionPatch {
        end_date: new_end_date,
        ..AuctionPatch::new()
    }
    .if_version(auction.version);
    let stc = stc_for(cmd, &lot);
    ctx.store
        .commit_bid(bid_commit(cmd, &lot, patch, stc, now))
        .await?;
    log_accepted(cmd, stc);

    let mut events = Vec::new();
    if let Some(end_date) = new_end_date {
        info!(
            "{:<12} --> 타임드 경매 종료 시간 연장 auction={} end_date={}",
            "Bid", auction.id, end_date
        );
        events.push(AuctionEvent::AuctionExtended {
            auction_id: auction.id,
            end_date,
            timestamp: now,
        });
    }
    events.push(bid_placed(cmd, &auction, stc, now));

    let extension = ExtensionInfo {
        extended: new_end_date.is_some(),
        end_date: new_end_date.unwrap_or(end_date),
    };
    Ok((receipt(cmd, &lot, stc, Some(extension)), events))
}

/// STC: the bid is below a positive reserve.
fn stc_for(cmd: &PlaceBidCommand, lot: &Lot) -> bool {
    let reserve = lot.reserve();
    reserve > 0 && cmd.bid_amount < reserve
}

/// The auction patch together with the bid record and the lot's new high bid.
fn bid_commit(
    cmd: &PlaceBidCommand,
    lot: &Lot,
    auction: AuctionPatch,
    stc: bool,
    now: DateTime<Utc>,
) -> BidCommit {
    BidCommit {
        auction_id: lot.auction,
        auction,
        bid: NewBid {
            lot: lot.id,
            user: cmd.bidder_id.clone(),
            amount: cmd.bid_amount,
            created_at: now,
        },
        lot: LotPatch {
            current_bid: Some(cmd.bid_amount),
            current_bidder: Some(cmd.bidder_id.clone()),
            stc: Some(stc),
            ..LotPatch::default()
        },
    }
}

fn bid_placed(cmd: &PlaceBidCommand, auction: &Auction, stc: bool, now: DateTime<Utc>) -> AuctionEvent {
    AuctionEvent::BidPlaced {
        auction_id: auction.id,
        lot_id: cmd.lot_id,
        bidder_id: cmd.bidder_id.clone(),
        bid_amount: cmd.bid_amount,
        stc,
        timestamp: now,
    }
}

fn log_accepted(cmd: &PlaceBidCommand, stc: bool) {
    info!(
        "{:<12} --> 입찰 성공 lot={} amount={} stc={}",
        "Bid", cmd.lot_id, cmd.bid_amount, stc
    );
}
// endregion: --- Bid Cycle

// region:    --- Helpers
/// Increment that applies to the next bid on `lot`.
fn increment_for(auction: &Auction, lot: &Lot, config: &EngineConfig) -> i64 {
    match auction.auction_type {
        AuctionType::Live => required_increment(
            lot,
            BidActivity {
                activity_level: auction.activity_level,
                inactivity_periods: auction.inactivity_periods,
            },
            config.default_increment,
        ),
        AuctionType::TimedAuction => base_increment(lot, config.default_increment),
    }
}

/// Recent-bid window and activity level after a live bid at `now`.
///
/// A burst escalates only while the lot clock (as it stood before this bid)
/// is inside the high-activity threshold; escalation empties the window.
fn next_activity(
    auction: &Auction,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> (Vec<DateTime<Utc>>, i32) {
    let window = span(config.recent_bid_window);
    let mut recent: Vec<DateTime<Utc>> = auction
        .recent_bid_timestamps
        .iter()
        .copied()
        .chain(std::iter::once(now))
        .filter(|ts| now - *ts < window)
        .collect();

    let mut level = auction.activity_level;
    let closing = auction
        .current_lot_end_time
        .is_some_and(|end| end - now < span(config.high_activity_threshold));
    if closing && recent.len() >= config.high_activity_bid_count {
        let escalated = (level + 1).min(config.max_activity_level);
        if escalated > level {
            level = escalated;
            recent.clear();
        }
    }
    (recent, level)
}

fn extension_window(auction: &Auction, config: &EngineConfig) -> chrono::Duration {
    positive(auction.extension_time)
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or_else(|| chrono::Duration::minutes(config.default_extension_minutes))
}

fn receipt(
    cmd: &PlaceBidCommand,
    lot: &Lot,
    stc: bool,
    extension: Option<ExtensionInfo>,
) -> BidReceipt {
    let suffix = match (lot.reserve() > 0, stc) {
        (false, _) => "",
        (true, true) => " (Subject to Confirmation)",
        (true, false) => " (Reserve Met)",
    };
    BidReceipt {
        success: true,
        message: format!("Bid placed successfully!{}", suffix),
        lot_id: lot.id,
        current_bid: cmd.bid_amount,
        stc,
        extension,
    }
}

fn log_failure(cmd: &PlaceBidCommand, e: &StoreError) {
    match e {
        StoreError::NotFound { .. } => {
            info!("{:<12} --> 입찰 대상 없음 lot={}: {}", "Bid", cmd.lot_id, e)
        }
        _ => error!("{:<12} --> 상품 조회 실패 lot={}: {}", "Bid", cmd.lot_id, e),
    }
}
// endregion: --- Helpers

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn live_auction(now: DateTime<Utc>) -> Auction {
        let mut auction = Auction::new(AuctionType::Live, now);
        auction.status = AuctionStatus::Active;
        auction.current_lot_end_time = Some(now + Duration::seconds(25));
        auction
    }

    #[test]
    fn window_drops_bids_older_than_fifteen_seconds() {
        let now = Utc::now();
        let mut auction = live_auction(now);
        auction.recent_bid_timestamps = vec![now - Duration::seconds(20), now - Duration::seconds(3)];
        let (recent, level) = next_activity(&auction, now, &EngineConfig::default());
        assert_eq!(recent, vec![now - Duration::seconds(3), now]);
        assert_eq!(level, 0);
    }

    #[test]
    fn burst_far_from_the_deadline_does_not_escalate() {
        let now = Utc::now();
        let mut auction = live_auction(now);
        auction.recent_bid_timestamps = vec![now - Duration::seconds(2), now - Duration::seconds(1)];
        let (recent, level) = next_activity(&auction, now, &EngineConfig::default());
        assert_eq!(recent.len(), 3);
        assert_eq!(level, 0);
    }

    #[test]
    fn escalation_is_capped_and_keeps_window_when_capped() {
        let now = Utc::now();
        let mut auction = live_auction(now);
        auction.current_lot_end_time = Some(now + Duration::seconds(4));
        auction.activity_level = 2;
        auction.recent_bid_timestamps = vec![now - Duration::seconds(2), now - Duration::seconds(1)];
        let (recent, level) = next_activity(&auction, now, &EngineConfig::default());
        assert_eq!(level, 2);
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn extension_defaults_to_five_minutes() {
        let mut auction = Auction::new(AuctionType::TimedAuction, Utc::now());
        let config = EngineConfig::default();
        assert_eq!(extension_window(&auction, &config), Duration::minutes(5));
        auction.extension_time = Some(0);
        assert_eq!(extension_window(&auction, &config), Duration::minutes(5));
        auction.extension_time = Some(2);
        assert_eq!(extension_window(&auction, &config), Duration::minutes(2));
    }
}
