use crate::guard::GuardError;
use crate::store::StoreError;
use thiserror::Error;

/// 입찰 처리 오류
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BidError {
    #[error("auction not active")]
    AuctionNotActive,
    #[error("lot not currently open")]
    LotNotOpen,
    #[error("bid below minimum: at least {required} required")]
    BelowMinimum { required: i64 },
    #[error("auction ended")]
    AuctionEnded,
    #[error("{0} not found")]
    NotFound(String),
    #[error("auction is busy, try again")]
    Busy,
    #[error("auction changed {attempts} times while bidding, try again")]
    MaxRetriesExceeded { attempts: u32 },
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl BidError {
    /// Stable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BidError::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            BidError::LotNotOpen => "LOT_NOT_OPEN",
            BidError::BelowMinimum { .. } => "LOW_BID",
            BidError::AuctionEnded => "ALREADY_ENDED",
            BidError::NotFound(_) => "NOT_FOUND",
            BidError::Busy => "BUSY",
            BidError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            BidError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// User-correctable failures; never worth retrying unchanged.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BidError::AuctionNotActive
                | BidError::LotNotOpen
                | BidError::BelowMinimum { .. }
                | BidError::AuctionEnded
                | BidError::NotFound(_)
        )
    }
}

impl From<StoreError> for BidError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => {
                BidError::NotFound(format!("{} record {}", collection, id))
            }
            other => BidError::Store(other),
        }
    }
}

impl From<GuardError> for BidError {
    fn from(_: GuardError) -> Self {
        BidError::Busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;

    #[test]
    fn below_minimum_is_a_validation_failure() {
        let e = BidError::BelowMinimum { required: 1200 };
        assert!(e.is_validation());
        assert_eq!(e.code(), "LOW_BID");
        assert!(e.to_string().starts_with("bid below minimum"));
    }

    #[test]
    fn missing_records_surface_as_validation_failures() {
        let e = BidError::from(StoreError::NotFound {
            collection: Collection::Lots,
            id: 5,
        });
        assert_eq!(e, BidError::NotFound("lots record 5".to_string()));
        assert!(e.is_validation());
    }

    #[test]
    fn infrastructure_failures_are_not_validation() {
        let e = BidError::from(StoreError::Timeout {
            operation: "read_lot",
        });
        assert!(!e.is_validation());
        assert_eq!(e.code(), "STORE_UNAVAILABLE");
        assert!(!BidError::Busy.is_validation());
    }
}
