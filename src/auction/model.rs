use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type AuctionId = i64;
pub type LotId = i64;
/// Opaque id of an already authenticated user.
pub type UserId = String;

// region:    --- Enumerations

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionType {
    #[serde(rename = "Live")]
    Live,
    #[serde(rename = "Timed Auction")]
    TimedAuction,
}

impl AuctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionType::Live => "Live",
            AuctionType::TimedAuction => "Timed Auction",
        }
    }
}

impl FromStr for AuctionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Live" => Ok(AuctionType::Live),
            "Timed Auction" => Ok(AuctionType::TimedAuction),
            other => Err(ParseEnumError {
                kind: "auction_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Intermission,
    Completed,
    /// Absorbing state for auctions that cannot run (no eligible lot).
    Error,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Scheduled => "scheduled",
            AuctionStatus::Active => "active",
            AuctionStatus::Intermission => "intermission",
            AuctionStatus::Completed => "completed",
            AuctionStatus::Error => "error",
        }
    }
}

impl FromStr for AuctionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AuctionStatus::Scheduled),
            "active" => Ok(AuctionStatus::Active),
            "intermission" => Ok(AuctionStatus::Intermission),
            "completed" => Ok(AuctionStatus::Completed),
            "error" => Ok(AuctionStatus::Error),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Pending,
    Ongoing,
    Completed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Pending => "pending",
            LotStatus::Ongoing => "ongoing",
            LotStatus::Completed => "completed",
        }
    }
}

impl FromStr for LotStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LotStatus::Pending),
            "ongoing" => Ok(LotStatus::Ongoing),
            "completed" => Ok(LotStatus::Completed),
            other => Err(ParseEnumError {
                kind: "lot_status",
                value: other.to_string(),
            }),
        }
    }
}

// endregion: --- Enumerations

// region:    --- Records

/// 경매 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub auction_type: AuctionType,
    pub status: AuctionStatus,
    pub start_date: Option<DateTime<Utc>>,
    /// Timed auctions only.
    pub end_date: Option<DateTime<Utc>>,
    pub current_lot: Option<LotId>,
    pub current_lot_end_time: Option<DateTime<Utc>>,
    pub next_lot_start_time: Option<DateTime<Utc>>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub inactivity_periods: i32,
    pub activity_level: i32,
    pub recent_bid_timestamps: Vec<DateTime<Utc>>,
    /// Anti-snipe extension in minutes (timed only).
    pub extension_time: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    /// Bare scheduled auction; stores assign the real id on insert.
    pub fn new(auction_type: AuctionType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            auction_type,
            status: AuctionStatus::Scheduled,
            start_date: None,
            end_date: None,
            current_lot: None,
            current_lot_end_time: None,
            next_lot_start_time: None,
            last_activity_time: None,
            inactivity_periods: 0,
            activity_level: 0,
            recent_bid_timestamps: Vec::new(),
            extension_time: None,
            version: 0,
            created_at,
        }
    }
}

/// Increment schedule of a lot. Tier overrides of zero count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementSchedule {
    pub increment_amount: Option<i64>,
    pub increment_higher: Option<i64>,
    pub increment_highest: Option<i64>,
    pub increment_low: Option<i64>,
    pub increment_lower: Option<i64>,
    pub increment_lowest: Option<i64>,
    pub auto_increment: bool,
}

/// 상품(로트) 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub auction: AuctionId,
    pub lot_status: LotStatus,
    pub starting_price: Option<i64>,
    pub current_bid: Option<i64>,
    pub current_bidder: Option<UserId>,
    pub reserve_price: Option<i64>,
    #[serde(rename = "STC")]
    pub stc: bool,
    #[serde(flatten)]
    pub increments: IncrementSchedule,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn new(auction: AuctionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            auction,
            lot_status: LotStatus::Pending,
            starting_price: None,
            current_bid: None,
            current_bidder: None,
            reserve_price: None,
            stc: false,
            increments: IncrementSchedule::default(),
            created_at,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.lot_status == LotStatus::Completed
    }

    /// Highest bid so far, else the starting price, else zero.
    pub fn current_price(&self) -> i64 {
        positive(self.current_bid)
            .or(positive(self.starting_price))
            .unwrap_or(0)
    }

    pub fn reserve(&self) -> i64 {
        positive(self.reserve_price).unwrap_or(0)
    }
}

pub(crate) fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

/// 입찰 모델 (추가 전용, 수정/삭제 없음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub lot: LotId,
    pub user: UserId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBid {
    pub lot: LotId,
    pub user: UserId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Records

// region:    --- Patches

/// Partial auction update, applied as one atomic write.
///
/// Nullable columns are tri-state: `None` leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionPatch {
    pub status: Option<AuctionStatus>,
    pub end_date: Option<DateTime<Utc>>,
    pub current_lot: Option<Option<LotId>>,
    pub current_lot_end_time: Option<Option<DateTime<Utc>>>,
    pub next_lot_start_time: Option<Option<DateTime<Utc>>>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub inactivity_periods: Option<i32>,
    pub activity_level: Option<i32>,
    pub recent_bid_timestamps: Option<Vec<DateTime<Utc>>>,
    /// Fail with a conflict unless the stored version still matches.
    pub if_version: Option<i64>,
}

impl AuctionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn if_version(mut self, version: i64) -> Self {
        self.if_version = Some(version);
        self
    }

    pub fn status(mut self, status: AuctionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Zero both counters and empty the recent-bid window.
    pub fn reset_counters(mut self) -> Self {
        self.inactivity_periods = Some(0);
        self.activity_level = Some(0);
        self.recent_bid_timestamps = Some(Vec::new());
        self
    }

    pub fn apply(&self, auction: &mut Auction) {
        if let Some(status) = self.status {
            auction.status = status;
        }
        if let Some(end_date) = self.end_date {
            auction.end_date = Some(end_date);
        }
        if let Some(current_lot) = self.current_lot {
            auction.current_lot = current_lot;
        }
        if let Some(end_time) = self.current_lot_end_time {
            auction.current_lot_end_time = end_time;
        }
        if let Some(start_time) = self.next_lot_start_time {
            auction.next_lot_start_time = start_time;
        }
        if let Some(last_activity) = self.last_activity_time {
            auction.last_activity_time = Some(last_activity);
        }
        if let Some(periods) = self.inactivity_periods {
            auction.inactivity_periods = periods;
        }
        if let Some(level) = self.activity_level {
            auction.activity_level = level;
        }
        if let Some(timestamps) = &self.recent_bid_timestamps {
            auction.recent_bid_timestamps = timestamps.clone();
        }
        auction.version += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotPatch {
    pub lot_status: Option<LotStatus>,
    pub current_bid: Option<i64>,
    pub current_bidder: Option<UserId>,
    pub stc: Option<bool>,
}

impl LotPatch {
    pub fn status(lot_status: LotStatus) -> Self {
        Self {
            lot_status: Some(lot_status),
            ..Self::default()
        }
    }

    pub fn apply(&self, lot: &mut Lot) {
        if let Some(status) = self.lot_status {
            lot.lot_status = status;
        }
        if let Some(amount) = self.current_bid {
            lot.current_bid = Some(amount);
        }
        if let Some(bidder) = &self.current_bidder {
            lot.current_bidder = Some(bidder.clone());
        }
        if let Some(stc) = self.stc {
            lot.stc = stc;
        }
    }
}

// endregion: --- Patches
