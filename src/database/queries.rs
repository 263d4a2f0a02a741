/// 경매 컬럼
pub const AUCTION_COLUMNS: &str = "id, auction_type, status, start_date, end_date, current_lot, current_lot_end_time, next_lot_start_time, last_activity_time, inactivity_periods, activity_level, recent_bid_timestamps, extension_time, version, created_at";

/// 상품 컬럼
pub const LOT_COLUMNS: &str = "id, auction_id, lot_status, starting_price, current_bid, current_bidder, reserve_price, stc, increment_amount, increment_higher, increment_highest, increment_low, increment_lower, increment_lowest, auto_increment, created_at";

/// 상품 존재 여부 조회
pub const LOT_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM lots WHERE id = $1)";

/// 경매 존재 여부 조회
pub const AUCTION_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM auctions WHERE id = $1)";

/// 입찰 기록 추가
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (lot_id, user_id, amount, created_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id, lot_id, user_id, amount, created_at
"#;
