//! Postgres-backed record store.
// region:    --- Imports
use super::queries;
use crate::auction::model::{
    Auction, AuctionId, AuctionPatch, Bid, IncrementSchedule, Lot, LotId, LotPatch, NewBid,
};
use crate::store::{
    AuctionField, BidCommit, Collection, Field, Filter, LotField, Query, RecordStore, SortOrder,
    StoreError, StoreResult, Value,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
// endregion: --- Imports

// region:    --- Rows
#[derive(Debug, FromRow)]
struct AuctionRow {
    id: i64,
    auction_type: String,
    status: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    current_lot: Option<i64>,
    current_lot_end_time: Option<DateTime<Utc>>,
    next_lot_start_time: Option<DateTime<Utc>>,
    last_activity_time: Option<DateTime<Utc>>,
    inactivity_periods: i32,
    activity_level: i32,
    recent_bid_timestamps: Vec<DateTime<Utc>>,
    extension_time: Option<i64>,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = StoreError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        Ok(Auction {
            id: row.id,
            auction_type: row
                .auction_type
                .parse()
                .map_err(|e| StoreError::Decode(format!("auction {}: {}", row.id, e)))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Decode(format!("auction {}: {}", row.id, e)))?,
            start_date: row.start_date,
            end_date: row.end_date,
            current_lot: row.current_lot,
            current_lot_end_time: row.current_lot_end_time,
            next_lot_start_time: row.next_lot_start_time,
            last_activity_time: row.last_activity_time,
            inactivity_periods: row.inactivity_periods,
            activity_level: row.activity_level,
            recent_bid_timestamps: row.recent_bid_timestamps,
            extension_time: row.extension_time,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LotRow {
    id: i64,
    auction_id: i64,
    lot_status: String,
    starting_price: Option<i64>,
    current_bid: Option<i64>,
    current_bidder: Option<String>,
    reserve_price: Option<i64>,
    stc: bool,
    increment_amount: Option<i64>,
    increment_higher: Option<i64>,
    increment_highest: Option<i64>,
    increment_low: Option<i64>,
    increment_lower: Option<i64>,
    increment_lowest: Option<i64>,
    auto_increment: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LotRow> for Lot {
    type Error = StoreError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        Ok(Lot {
            id: row.id,
            auction: row.auction_id,
            lot_status: row
                .lot_status
                .parse()
                .map_err(|e| StoreError::Decode(format!("lot {}: {}", row.id, e)))?,
            starting_price: row.starting_price,
            current_bid: row.current_bid,
            current_bidder: row.current_bidder,
            reserve_price: row.reserve_price,
            stc: row.stc,
            increments: IncrementSchedule {
                increment_amount: row.increment_amount,
                increment_higher: row.increment_higher,
                increment_highest: row.increment_highest,
                increment_low: row.increment_low,
                increment_lower: row.increment_lower,
                increment_lowest: row.increment_lowest,
                auto_increment: row.auto_increment,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BidRow {
    id: i64,
    lot_id: i64,
    user_id: String,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        Bid {
            id: row.id,
            lot: row.lot_id,
            user: row.user_id,
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}
// endregion: --- Rows

// region:    --- Query Building
fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Int(v) => {
            qb.push_bind(*v);
        }
        Value::Text(v) => {
            qb.push_bind(v.clone());
        }
        Value::Time(v) => {
            qb.push_bind(*v);
        }
    }
}

fn push_filter<F: Field>(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter<F>) {
    for (i, condition) in filter.conditions.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(condition.field.column());
        qb.push(condition.op.sql());
        push_value(qb, &condition.value);
    }
}

fn select<F: Field>(table: &str, columns: &str, query: &Query<F>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", columns, table));
    push_filter(&mut qb, &query.filter);
    for (i, (field, order)) in query.sort.iter().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(field.column());
        qb.push(match order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit.max(0));
    }
    qb
}

fn auction_update(id: AuctionId, patch: &AuctionPatch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE auctions SET version = version + 1");
    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(end_date) = patch.end_date {
        qb.push(", end_date = ").push_bind(end_date);
    }
    if let Some(current_lot) = patch.current_lot {
        qb.push(", current_lot = ").push_bind(current_lot);
    }
    if let Some(end_time) = patch.current_lot_end_time {
        qb.push(", current_lot_end_time = ").push_bind(end_time);
    }
    if let Some(start_time) = patch.next_lot_start_time {
        qb.push(", next_lot_start_time = ").push_bind(start_time);
    }
    if let Some(last_activity) = patch.last_activity_time {
        qb.push(", last_activity_time = ").push_bind(last_activity);
    }
    if let Some(periods) = patch.inactivity_periods {
        qb.push(", inactivity_periods = ").push_bind(periods);
    }
    if let Some(level) = patch.activity_level {
        qb.push(", activity_level = ").push_bind(level);
    }
    if let Some(timestamps) = &patch.recent_bid_timestamps {
        qb.push(", recent_bid_timestamps = ")
            .push_bind(timestamps.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);
    if let Some(version) = patch.if_version {
        qb.push(" AND version = ").push_bind(version);
    }
    qb.push(format!(" RETURNING {}", queries::AUCTION_COLUMNS));
    qb
}

fn lot_update(id: LotId, patch: &LotPatch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE lots SET id = id");
    if let Some(status) = patch.lot_status {
        qb.push(", lot_status = ").push_bind(status.as_str());
    }
    if let Some(amount) = patch.current_bid {
        qb.push(", current_bid = ").push_bind(amount);
    }
    if let Some(bidder) = &patch.current_bidder {
        qb.push(", current_bidder = ").push_bind(bidder.clone());
    }
    if let Some(stc) = patch.stc {
        qb.push(", stc = ").push_bind(stc);
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(format!(" RETURNING {}", queries::LOT_COLUMNS));
    qb
}
// endregion: --- Query Building

// region:    --- Pg Record Store
/// Postgres 레코드 저장소
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Arc<PgPool>,
}

impl PgRecordStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &'static str, id: i64) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(&*self.pool)
            .await?)
    }

    /// 입찰 트랜잭션 본문: 경매 -> 상품 -> 입찰 기록
    async fn write_bid(tx: &mut Transaction<'_, Postgres>, commit: BidCommit) -> StoreResult<Bid> {
        let auction_id = commit.auction_id;
        let mut qb = auction_update(auction_id, &commit.auction);
        let row = qb
            .build_query_as::<AuctionRow>()
            .fetch_optional(&mut **tx)
            .await?;
        if row.is_none() {
            let exists = sqlx::query_scalar::<_, bool>(queries::AUCTION_EXISTS)
                .bind(auction_id)
                .fetch_one(&mut **tx)
                .await?;
            return Err(unmatched_auction(auction_id, exists));
        }

        let mut qb = lot_update(commit.bid.lot, &commit.lot);
        let row = qb
            .build_query_as::<LotRow>()
            .fetch_optional(&mut **tx)
            .await?;
        if row.is_none() {
            return Err(StoreError::NotFound {
                collection: Collection::Lots,
                id: commit.bid.lot,
            });
        }

        let bid = commit.bid;
        let row = sqlx::query_as::<_, BidRow>(queries::INSERT_BID)
            .bind(bid.lot)
            .bind(bid.user)
            .bind(bid.amount)
            .bind(bid.created_at)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.into())
    }
}

/// A versioned update that matched no row: stale version or missing record.
fn unmatched_auction(id: AuctionId, exists: bool) -> StoreError {
    if exists {
        StoreError::Conflict {
            collection: Collection::Auctions,
            id,
        }
    } else {
        StoreError::NotFound {
            collection: Collection::Auctions,
            id,
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn read_auctions(&self, query: Query<AuctionField>) -> StoreResult<Vec<Auction>> {
        let mut qb = select(Collection::Auctions.table(), queries::AUCTION_COLUMNS, &query);
        let rows = qb
            .build_query_as::<AuctionRow>()
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(Auction::try_from).collect()
    }

    async fn read_auction(&self, id: AuctionId) -> StoreResult<Auction> {
        let query = Query::new(Filter::new().eq(AuctionField::Id, id)).limit(1);
        self.read_auctions(query)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound {
                collection: Collection::Auctions,
                id,
            })
    }

    async fn update_auction(&self, id: AuctionId, patch: AuctionPatch) -> StoreResult<Auction> {
        let mut qb = auction_update(id, &patch);
        let row = qb
            .build_query_as::<AuctionRow>()
            .fetch_optional(&*self.pool)
            .await?;
        match row {
            Some(row) => Auction::try_from(row),
            None => Err(unmatched_auction(
                id,
                self.exists(queries::AUCTION_EXISTS, id).await?,
            )),
        }
    }

    async fn read_lots(&self, query: Query<LotField>) -> StoreResult<Vec<Lot>> {
        let mut qb = select(Collection::Lots.table(), queries::LOT_COLUMNS, &query);
        let rows = qb.build_query_as::<LotRow>().fetch_all(&*self.pool).await?;
        rows.into_iter().map(Lot::try_from).collect()
    }

    async fn read_lot(&self, id: LotId) -> StoreResult<Lot> {
        let query = Query::new(Filter::new().eq(LotField::Id, id)).limit(1);
        self.read_lots(query)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound {
                collection: Collection::Lots,
                id,
            })
    }

    async fn update_lot(&self, id: LotId, patch: LotPatch) -> StoreResult<Lot> {
        let mut qb = lot_update(id, &patch);
        let row = qb
            .build_query_as::<LotRow>()
            .fetch_optional(&*self.pool)
            .await?;
        row.ok_or(StoreError::NotFound {
            collection: Collection::Lots,
            id,
        })
        .and_then(Lot::try_from)
    }

    async fn count_lots(&self, filter: Filter<LotField>) -> StoreResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM lots");
        push_filter(&mut qb, &filter);
        Ok(qb
            .build_query_scalar::<i64>()
            .fetch_one(&*self.pool)
            .await?)
    }

    async fn create_bid(&self, bid: NewBid) -> StoreResult<Bid> {
        if !self.exists(queries::LOT_EXISTS, bid.lot).await? {
            return Err(StoreError::NotFound {
                collection: Collection::Lots,
                id: bid.lot,
            });
        }
        let row = sqlx::query_as::<_, BidRow>(queries::INSERT_BID)
            .bind(bid.lot)
            .bind(bid.user)
            .bind(bid.amount)
            .bind(bid.created_at)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.into())
    }

    async fn commit_bid(&self, commit: BidCommit) -> StoreResult<Bid> {
        let mut tx = self.pool.begin().await?;
        let result = Self::write_bid(&mut tx, commit).await;
        match result {
            Ok(bid) => {
                tx.commit().await?;
                Ok(bid)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }
}
// endregion: --- Pg Record Store
