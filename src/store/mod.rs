//! Record store contract
//!
//! The single source of truth for auctions, lots and bids. The engine
//! only ever holds request-scoped copies of these records and re-reads
//! them before every decision.
// region:    --- Imports
use crate::auction::model::{
    Auction, AuctionId, AuctionPatch, Bid, Lot, LotId, LotPatch, NewBid,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use thiserror::Error;

pub mod memory;
pub mod timeout;

pub use memory::MemoryRecordStore;
pub use timeout::TimeoutStore;
// endregion: --- Imports

// region:    --- Errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: i64 },
    #[error("{collection} record {id} was modified concurrently")]
    Conflict { collection: Collection, id: i64 },
    #[error("store operation `{operation}` timed out")]
    Timeout { operation: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed record: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
// endregion: --- Errors

// region:    --- Filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Auctions,
    Lots,
    Bids,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Auctions => "auctions",
            Collection::Lots => "lots",
            Collection::Bids => "bids",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A scalar a filter compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl Value {
    /// SQL-style comparison: anything involving NULL or mismatched kinds
    /// is incomparable.
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lte,
    Gte,
}

impl Op {
    pub fn sql(&self) -> &'static str {
        match self {
            Op::Eq => " = ",
            Op::Ne => " <> ",
            Op::Lte => " <= ",
            Op::Gte => " >= ",
        }
    }

    fn matches(&self, left: &Value, right: &Value) -> bool {
        match left.compare(right) {
            None => false,
            Some(ord) => match self {
                Op::Eq => ord == Ordering::Equal,
                Op::Ne => ord != Ordering::Equal,
                Op::Lte => ord != Ordering::Greater,
                Op::Gte => ord != Ordering::Less,
            },
        }
    }
}

/// Columns a collection can be filtered and sorted on.
pub trait Field: Copy + std::fmt::Debug + Send + Sync {
    fn column(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionField {
    Id,
    AuctionType,
    Status,
    StartDate,
    EndDate,
    NextLotStartTime,
    CreatedAt,
}

impl Field for AuctionField {
    fn column(&self) -> &'static str {
        match self {
            AuctionField::Id => "id",
            AuctionField::AuctionType => "auction_type",
            AuctionField::Status => "status",
            AuctionField::StartDate => "start_date",
            AuctionField::EndDate => "end_date",
            AuctionField::NextLotStartTime => "next_lot_start_time",
            AuctionField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotField {
    Id,
    Auction,
    LotStatus,
    CreatedAt,
}

impl Field for LotField {
    fn column(&self) -> &'static str {
        match self {
            LotField::Id => "id",
            LotField::Auction => "auction_id",
            LotField::LotStatus => "lot_status",
            LotField::CreatedAt => "created_at",
        }
    }
}

/// Read access to a record's filterable fields.
pub trait Record<F: Field> {
    fn value(&self, field: F) -> Value;
}

impl Record<AuctionField> for Auction {
    fn value(&self, field: AuctionField) -> Value {
        match field {
            AuctionField::Id => self.id.into(),
            AuctionField::AuctionType => self.auction_type.as_str().into(),
            AuctionField::Status => self.status.as_str().into(),
            AuctionField::StartDate => self.start_date.into(),
            AuctionField::EndDate => self.end_date.into(),
            AuctionField::NextLotStartTime => self.next_lot_start_time.into(),
            AuctionField::CreatedAt => self.created_at.into(),
        }
    }
}

impl Record<LotField> for Lot {
    fn value(&self, field: LotField) -> Value {
        match field {
            LotField::Id => self.id.into(),
            LotField::Auction => self.auction.into(),
            LotField::LotStatus => self.lot_status.as_str().into(),
            LotField::CreatedAt => self.created_at.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition<F> {
    pub field: F,
    pub op: Op,
    pub value: Value,
}

/// Conditions composed by logical AND. An empty filter matches everything.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<F> {
    pub conditions: Vec<Condition<F>>,
}

impl<F: Field> Default for Filter<F> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }
}

impl<F: Field> Filter<F> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: F, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: F, value: impl Into<Value>) -> Self {
        self.push(field, Op::Eq, value)
    }

    pub fn ne(self, field: F, value: impl Into<Value>) -> Self {
        self.push(field, Op::Ne, value)
    }

    pub fn lte(self, field: F, value: impl Into<Value>) -> Self {
        self.push(field, Op::Lte, value)
    }

    pub fn gte(self, field: F, value: impl Into<Value>) -> Self {
        self.push(field, Op::Gte, value)
    }

    pub fn matches<R: Record<F>>(&self, record: &R) -> bool {
        self.conditions
            .iter()
            .all(|c| c.op.matches(&record.value(c.field), &c.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query<F> {
    pub filter: Filter<F>,
    pub sort: Vec<(F, SortOrder)>,
    pub limit: Option<i64>,
}

impl<F: Field> Query<F> {
    pub fn new(filter: Filter<F>) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn sort_by(mut self, field: F, order: SortOrder) -> Self {
        self.sort.push((field, order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filter, sort and truncate an in-memory candidate set.
    pub fn apply<R: Record<F> + Clone>(&self, records: impl Iterator<Item = R>) -> Vec<R> {
        let mut selected: Vec<R> = records.filter(|r| self.filter.matches(r)).collect();
        selected.sort_by(|a, b| {
            for (field, order) in &self.sort {
                let ord = a
                    .value(*field)
                    .compare(&b.value(*field))
                    .unwrap_or(Ordering::Equal);
                let ord = match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        if let Some(limit) = self.limit {
            selected.truncate(limit.max(0) as usize);
        }
        selected
    }
}
// endregion: --- Filters

// region:    --- Record Store Trait
/// The writes of one accepted bid. Applied all together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct BidCommit {
    pub auction_id: AuctionId,
    pub auction: AuctionPatch,
    pub bid: NewBid,
    pub lot: LotPatch,
}

/// 레코드 저장소 트레이트
///
/// Each update is a single atomic write of one entity. Auction updates bump
/// the stored version and honour `AuctionPatch::if_version`.
/// `commit_bid` is the one multi-entity write: auction, bid and lot in a
/// single transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_auctions(&self, query: Query<AuctionField>) -> StoreResult<Vec<Auction>>;
    async fn read_auction(&self, id: AuctionId) -> StoreResult<Auction>;
    async fn update_auction(&self, id: AuctionId, patch: AuctionPatch) -> StoreResult<Auction>;

    async fn read_lots(&self, query: Query<LotField>) -> StoreResult<Vec<Lot>>;
    async fn read_lot(&self, id: LotId) -> StoreResult<Lot>;
    async fn update_lot(&self, id: LotId, patch: LotPatch) -> StoreResult<Lot>;
    async fn count_lots(&self, filter: Filter<LotField>) -> StoreResult<i64>;

    async fn create_bid(&self, bid: NewBid) -> StoreResult<Bid>;
    async fn commit_bid(&self, commit: BidCommit) -> StoreResult<Bid>;
}
// endregion: --- Record Store Trait

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{AuctionStatus, AuctionType, LotStatus};
    use chrono::Duration;

    #[test]
    fn null_never_satisfies_a_comparison() {
        let now = Utc::now();
        let auction = Auction::new(AuctionType::Live, now);
        let filter = Filter::new().lte(AuctionField::NextLotStartTime, now);
        assert!(!filter.matches(&auction));
        let filter = Filter::new().ne(AuctionField::NextLotStartTime, now);
        assert!(!filter.matches(&auction));
    }

    #[test]
    fn conditions_compose_by_and() {
        let now = Utc::now();
        let mut auction = Auction::new(AuctionType::Live, now);
        auction.start_date = Some(now - Duration::seconds(5));

        let due = Filter::new()
            .eq(AuctionField::Status, AuctionStatus::Scheduled.as_str())
            .eq(AuctionField::AuctionType, AuctionType::Live.as_str())
            .lte(AuctionField::StartDate, now);
        assert!(due.matches(&auction));

        let not_yet = due.clone().gte(AuctionField::StartDate, now);
        assert!(!not_yet.matches(&auction));
    }

    #[test]
    fn query_sorts_then_limits() {
        let base = Utc::now();
        let lots: Vec<Lot> = (1..=4)
            .map(|i| {
                let mut lot = Lot::new(1, base - Duration::seconds(i));
                lot.id = i;
                if i == 4 {
                    lot.lot_status = LotStatus::Completed;
                }
                lot
            })
            .collect();

        let query = Query::new(Filter::new().ne(LotField::LotStatus, "completed"))
            .sort_by(LotField::CreatedAt, SortOrder::Asc)
            .limit(2);
        let ids: Vec<LotId> = query.apply(lots.into_iter()).iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
