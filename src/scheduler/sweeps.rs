//! Lifecycle sweeps.
//!
//! Each sweep reads its candidates, then handles every auction on its own:
//! lock, re-read, re-check the predicate, write. A failure on one auction
//! is counted in the report and the sweep moves on. Events raised while an
//! auction is locked are published once its lock is released.
// region:    --- Imports
use super::{Outcome, SweepError, SweepReport};
use crate::auction::events::AuctionEvent;
use crate::auction::model::{
    Auction, AuctionId, AuctionPatch, AuctionStatus, AuctionType, Lot, LotId, LotPatch, LotStatus,
};
use crate::config::span;
use crate::context::EngineContext;
use crate::store::{AuctionField, Filter, LotField, Query, SortOrder, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use tracing::{error, info};
// endregion: --- Imports

type SweepResult = Result<Outcome, SweepError>;

// region:    --- Sweeps
/// 1. 활성화 스윕
///
/// Scheduled live auctions whose start date has passed open their earliest
/// unfinished lot; an auction without one moves to `error`.
pub async fn run_activation_sweep(ctx: &EngineContext) -> StoreResult<SweepReport> {
    let now = ctx.now();
    let candidates = read_candidates(
        ctx,
        Filter::new()
            .eq(AuctionField::Status, AuctionStatus::Scheduled.as_str())
            .eq(AuctionField::AuctionType, AuctionType::Live.as_str())
            .lte(AuctionField::StartDate, now),
    )
    .await?;

    let mut report = new_report(&candidates);
    for auction_id in candidates {
        let mut events = Vec::new();
        let result = activate(ctx, auction_id, &mut events).await;
        report.record("activation", auction_id, result);
        ctx.publish_all(events).await;
    }
    Ok(report)
}

/// 2. 인터미션 종료 스윕
pub async fn run_intermission_sweep(ctx: &EngineContext) -> StoreResult<SweepReport> {
    let now = ctx.now();
    let candidates = read_candidates(
        ctx,
        Filter::new()
            .eq(AuctionField::Status, AuctionStatus::Intermission.as_str())
            .lte(AuctionField::NextLotStartTime, now),
    )
    .await?;

    let mut report = new_report(&candidates);
    for auction_id in candidates {
        let mut events = Vec::new();
        let result = end_intermission(ctx, auction_id, &mut events).await;
        report.record("intermission", auction_id, result);
        ctx.publish_all(events).await;
    }
    Ok(report)
}

/// 3. 진행중 라이브 경매 틱
///
/// Expires the current lot when its clock ran out, otherwise accumulates
/// inactivity periods.
pub async fn run_active_tick(ctx: &EngineContext) -> StoreResult<SweepReport> {
    let candidates = read_candidates(
        ctx,
        Filter::new()
            .eq(AuctionField::Status, AuctionStatus::Active.as_str())
            .eq(AuctionField::AuctionType, AuctionType::Live.as_str()),
    )
    .await?;

    let mut report = new_report(&candidates);
    for auction_id in candidates {
        let mut events = Vec::new();
        let result = tick(ctx, auction_id, &mut events).await;
        report.record("active-tick", auction_id, result);
        ctx.publish_all(events).await;
    }
    Ok(report)
}

/// 4. 타임드 경매 종료 스윕
pub async fn run_timed_conclusion_sweep(ctx: &EngineContext) -> StoreResult<SweepReport> {
    let now = ctx.now();
    let candidates = read_candidates(
        ctx,
        Filter::new()
            .eq(AuctionField::Status, AuctionStatus::Active.as_str())
            .eq(AuctionField::AuctionType, AuctionType::TimedAuction.as_str())
            .lte(AuctionField::EndDate, now),
    )
    .await?;

    let mut report = new_report(&candidates);
    for auction_id in candidates {
        let mut events = Vec::new();
        let result = close_timed(ctx, auction_id, &mut events).await;
        report.record("timed-close", auction_id, result);
        ctx.publish_all(events).await;
    }
    Ok(report)
}
// endregion: --- Sweeps

// region:    --- Transitions
async fn activate(
    ctx: &EngineContext,
    auction_id: AuctionId,
    events: &mut Vec<AuctionEvent>,
) -> SweepResult {
    let _guard = ctx.lock_auction(auction_id).await?;
    let auction = ctx.store.read_auction(auction_id).await?;
    let now = ctx.now();

    let due = auction.status == AuctionStatus::Scheduled
        && auction.auction_type == AuctionType::Live
        && auction.start_date.is_some_and(|start| start <= now);
    if !due {
        return Ok(Outcome::Skipped);
    }

    let Some(lot) = next_open_lot(ctx, auction.id, None).await? else {
        ctx.store
            .update_auction(
                auction.id,
                AuctionPatch::new()
                    .status(AuctionStatus::Error)
                    .if_version(auction.version),
            )
            .await?;
        error!(
            "{:<12} --> 진행 가능한 로트가 없어 경매를 오류 상태로 전환 auction={}",
            "Scheduler", auction.id
        );
        events.push(AuctionEvent::AuctionFailed {
            auction_id: auction.id,
            reason: "no eligible lot".to_string(),
            timestamp: now,
        });
        return Ok(Outcome::Transitioned);
    };

    let lot_end_time = start_lot(ctx, &auction, lot.id, now).await?;
    info!(
        "{:<12} --> 라이브 경매 활성화 auction={} lot={}",
        "Scheduler", auction.id, lot.id
    );
    events.push(AuctionEvent::AuctionActivated {
        auction_id: auction.id,
        lot_id: lot.id,
        timestamp: now,
    });
    events.push(AuctionEvent::LotStarted {
        auction_id: auction.id,
        lot_id: lot.id,
        lot_end_time,
        timestamp: now,
    });
    Ok(Outcome::Transitioned)
}

async fn end_intermission(
    ctx: &EngineContext,
    auction_id: AuctionId,
    events: &mut Vec<AuctionEvent>,
) -> SweepResult {
    let _guard = ctx.lock_auction(auction_id).await?;
    let auction = ctx.store.read_auction(auction_id).await?;
    let now = ctx.now();

    let due = auction.status == AuctionStatus::Intermission
        && auction.next_lot_start_time.is_some_and(|start| start <= now);
    if !due {
        return Ok(Outcome::Skipped);
    }

    // 선택된 로트가 사라졌거나 이미 끝났으면 다음 로트를 다시 찾는다
    let selected = match auction.current_lot {
        Some(lot_id) => match ctx.store.read_lot(lot_id).await {
            Ok(lot) if !lot.is_concluded() => Some(lot),
            Ok(_) | Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let lot = match selected {
        Some(lot) => Some(lot),
        None => next_open_lot(ctx, auction.id, None).await?,
    };
    let Some(lot) = lot else {
        conclude(ctx, &auction, None, now, events).await?;
        return Ok(Outcome::Transitioned);
    };

    let lot_end_time = start_lot(ctx, &auction, lot.id, now).await?;
    info!(
        "{:<12} --> 인터미션 종료, 다음 로트 시작 auction={} lot={}",
        "Scheduler", auction.id, lot.id
    );
    events.push(AuctionEvent::LotStarted {
        auction_id: auction.id,
        lot_id: lot.id,
        lot_end_time,
        timestamp: now,
    });
    Ok(Outcome::Transitioned)
}

async fn tick(
    ctx: &EngineContext,
    auction_id: AuctionId,
    events: &mut Vec<AuctionEvent>,
) -> SweepResult {
    let _guard = ctx.lock_auction(auction_id).await?;
    let auction = ctx.store.read_auction(auction_id).await?;
    let now = ctx.now();

    if auction.status != AuctionStatus::Active || auction.auction_type != AuctionType::Live {
        return Ok(Outcome::Skipped);
    }
    let Some(last_activity) = auction.last_activity_time else {
        return Ok(Outcome::Skipped);
    };
    // 방금 입찰이 들어온 경매는 다음 틱에서 처리
    if now - last_activity < span(ctx.config.activity_debounce) {
        return Ok(Outcome::Skipped);
    }

    let Some(current_lot) = auction.current_lot else {
        let remaining = ctx
            .store
            .count_lots(open_lots_of(auction.id))
            .await?;
        if remaining == 0 {
            conclude(ctx, &auction, None, now, events).await?;
        } else {
            advance(ctx, &auction, None, now, events).await?;
        }
        return Ok(Outcome::Transitioned);
    };
    let Some(lot_end_time) = auction.current_lot_end_time else {
        return Ok(Outcome::Skipped);
    };

    if now >= lot_end_time {
        info!(
            "{:<12} --> 로트 시간 만료 auction={} lot={}",
            "Scheduler", auction.id, current_lot
        );
        advance(ctx, &auction, Some(current_lot), now, events).await?;
        return Ok(Outcome::Transitioned);
    }

    let periods = inactivity_periods(now - last_activity, ctx);
    if periods <= auction.inactivity_periods {
        return Ok(Outcome::Skipped);
    }
    ctx.store
        .update_auction(
            auction.id,
            AuctionPatch {
                inactivity_periods: Some(periods),
                ..AuctionPatch::new()
            }
            .if_version(auction.version),
        )
        .await?;
    info!(
        "{:<12} --> 비활동 구간 증가 auction={} periods={}",
        "Scheduler", auction.id, periods
    );
    events.push(AuctionEvent::InactivityIncreased {
        auction_id: auction.id,
        inactivity_periods: periods,
        timestamp: now,
    });
    Ok(Outcome::Transitioned)
}

async fn close_timed(
    ctx: &EngineContext,
    auction_id: AuctionId,
    events: &mut Vec<AuctionEvent>,
) -> SweepResult {
    let _guard = ctx.lock_auction(auction_id).await?;
    let auction = ctx.store.read_auction(auction_id).await?;
    let now = ctx.now();

    let due = auction.status == AuctionStatus::Active
        && auction.auction_type == AuctionType::TimedAuction
        && auction.end_date.is_some_and(|end| end <= now);
    if !due {
        return Ok(Outcome::Skipped);
    }

    // 로트를 먼저 닫는다: 실패하면 경매가 active로 남아 다음 스윕이 다시 처리
    let open_lots = ctx
        .store
        .read_lots(Query::new(open_lots_of(auction.id)).sort_by(LotField::Id, SortOrder::Asc))
        .await?;
    for lot in open_lots {
        retire_lot(ctx, auction.id, lot.id, now, events).await?;
    }

    ctx.store
        .update_auction(
            auction.id,
            AuctionPatch::new()
                .status(AuctionStatus::Completed)
                .if_version(auction.version),
        )
        .await?;

    info!("{:<12} --> 타임드 경매 종료 auction={}", "Scheduler", auction.id);
    events.push(AuctionEvent::AuctionCompleted {
        auction_id: auction.id,
        timestamp: now,
    });
    Ok(Outcome::Transitioned)
}
// endregion: --- Transitions

// region:    --- Lot Advancement
/// Open `lot_id` on a fresh clock. Returns the lot's end time.
async fn start_lot(
    ctx: &EngineContext,
    auction: &Auction,
    lot_id: LotId,
    now: DateTime<Utc>,
) -> StoreResult<DateTime<Utc>> {
    let lot_end_time = now + span(ctx.config.base_timer_duration);
    let patch = AuctionPatch {
        current_lot: Some(Some(lot_id)),
        current_lot_end_time: Some(Some(lot_end_time)),
        next_lot_start_time: Some(None),
        last_activity_time: Some(now),
        ..AuctionPatch::new()
    }
    .status(AuctionStatus::Active)
    .reset_counters()
    .if_version(auction.version);

    ctx.store.update_auction(auction.id, patch).await?;
    ctx.store
        .update_lot(lot_id, LotPatch::status(LotStatus::Ongoing))
        .await?;
    Ok(lot_end_time)
}

/// Retire `retiring` (if any) and move on: intermission with the next lot,
/// or conclusion when none is left.
///
/// The retired lot is closed before the auction leaves it. If the auction
/// write then fails, the next tick finds the same expired lot and retries.
async fn advance(
    ctx: &EngineContext,
    auction: &Auction,
    retiring: Option<LotId>,
    now: DateTime<Utc>,
    events: &mut Vec<AuctionEvent>,
) -> StoreResult<()> {
    let Some(next) = next_open_lot(ctx, auction.id, retiring).await? else {
        return conclude(ctx, auction, retiring, now, events).await;
    };

    if let Some(lot_id) = retiring {
        retire_lot(ctx, auction.id, lot_id, now, events).await?;
    }

    let next_lot_start_time = now + span(ctx.config.grace_period_duration);
    let patch = AuctionPatch {
        current_lot: Some(Some(next.id)),
        current_lot_end_time: Some(None),
        next_lot_start_time: Some(Some(next_lot_start_time)),
        ..AuctionPatch::new()
    }
    .status(AuctionStatus::Intermission)
    .reset_counters()
    .if_version(auction.version);
    ctx.store.update_auction(auction.id, patch).await?;

    info!(
        "{:<12} --> 인터미션 시작 auction={} next_lot={} start={}",
        "Scheduler", auction.id, next.id, next_lot_start_time
    );
    events.push(AuctionEvent::IntermissionStarted {
        auction_id: auction.id,
        next_lot_id: next.id,
        next_lot_start_time,
        timestamp: now,
    });
    Ok(())
}

async fn conclude(
    ctx: &EngineContext,
    auction: &Auction,
    retiring: Option<LotId>,
    now: DateTime<Utc>,
    events: &mut Vec<AuctionEvent>,
) -> StoreResult<()> {
    if let Some(lot_id) = retiring {
        retire_lot(ctx, auction.id, lot_id, now, events).await?;
    }

    let patch = AuctionPatch {
        current_lot: Some(None),
        current_lot_end_time: Some(None),
        next_lot_start_time: Some(None),
        ..AuctionPatch::new()
    }
    .status(AuctionStatus::Completed)
    .if_version(auction.version);
    ctx.store.update_auction(auction.id, patch).await?;

    info!("{:<12} --> 경매 종료 auction={}", "Scheduler", auction.id);
    events.push(AuctionEvent::AuctionCompleted {
        auction_id: auction.id,
        timestamp: now,
    });
    Ok(())
}

/// Mark a lot completed. Safe to repeat.
async fn retire_lot(
    ctx: &EngineContext,
    auction_id: AuctionId,
    lot_id: LotId,
    now: DateTime<Utc>,
    events: &mut Vec<AuctionEvent>,
) -> StoreResult<()> {
    ctx.store
        .update_lot(lot_id, LotPatch::status(LotStatus::Completed))
        .await?;
    events.push(AuctionEvent::LotCompleted {
        auction_id,
        lot_id,
        timestamp: now,
    });
    Ok(())
}

/// Earliest unfinished lot of an auction, by creation order.
async fn next_open_lot(
    ctx: &EngineContext,
    auction_id: AuctionId,
    exclude: Option<LotId>,
) -> StoreResult<Option<Lot>> {
    let mut filter = open_lots_of(auction_id);
    if let Some(lot_id) = exclude {
        filter = filter.ne(LotField::Id, lot_id);
    }
    let query = Query::new(filter)
        .sort_by(LotField::CreatedAt, SortOrder::Asc)
        .sort_by(LotField::Id, SortOrder::Asc)
        .limit(1);
    Ok(ctx.store.read_lots(query).await?.into_iter().next())
}
// endregion: --- Lot Advancement

// region:    --- Helpers
fn open_lots_of(auction_id: AuctionId) -> Filter<LotField> {
    Filter::new()
        .eq(LotField::Auction, auction_id)
        .ne(LotField::LotStatus, LotStatus::Completed.as_str())
}

async fn read_candidates(
    ctx: &EngineContext,
    filter: Filter<AuctionField>,
) -> StoreResult<Vec<AuctionId>> {
    let auctions = ctx
        .store
        .read_auctions(Query::new(filter).sort_by(AuctionField::Id, SortOrder::Asc))
        .await?;
    Ok(auctions.into_iter().map(|a| a.id).collect())
}

fn new_report(candidates: &[AuctionId]) -> SweepReport {
    SweepReport {
        candidates: candidates.len(),
        ..SweepReport::default()
    }
}

/// Whole inactivity thresholds elapsed, capped.
fn inactivity_periods(elapsed: chrono::Duration, ctx: &EngineContext) -> i32 {
    let threshold = span(ctx.config.inactivity_threshold).num_milliseconds().max(1);
    let periods = elapsed.num_milliseconds().max(0) / threshold;
    periods.min(i64::from(ctx.config.max_inactivity_periods)) as i32
}
// endregion: --- Helpers
