//! Bid increment policy.
//!
//! Pure functions of a lot's increment schedule and the auction's
//! activity counters; no I/O, no clock.
use crate::auction::model::{positive, Lot};

/// The part of an auction's state the increment depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BidActivity {
    pub activity_level: i32,
    pub inactivity_periods: i32,
}

/// Base increment of a lot, falling back to `default_increment`.
pub fn base_increment(lot: &Lot, default_increment: i64) -> i64 {
    positive(lot.increments.increment_amount).unwrap_or(default_increment)
}

/// 입찰 단위 계산
///
/// Escalated activity wins over inactivity; without either, the base
/// increment applies.
pub fn required_increment(lot: &Lot, activity: BidActivity, default_increment: i64) -> i64 {
    let schedule = &lot.increments;
    let base = base_increment(lot, default_increment);

    if activity.activity_level >= 2 {
        return positive(schedule.increment_highest).unwrap_or(base);
    }
    if activity.activity_level == 1 {
        return positive(schedule.increment_higher).unwrap_or(base);
    }

    if activity.inactivity_periods > 0 {
        if schedule.auto_increment {
            let factor = match activity.inactivity_periods {
                1 => 2.0 / 3.0,
                2 => 1.0 / 3.0,
                _ => 1.0 / 6.0,
            };
            return ((base as f64 * factor).round() as i64).max(1);
        }
        let tier = match activity.inactivity_periods {
            1 => schedule.increment_low,
            2 => schedule.increment_lower,
            _ => schedule.increment_lowest,
        };
        return positive(tier).unwrap_or(base);
    }

    base
}

/// Smallest acceptable next bid.
pub fn required_bid(lot: &Lot, activity: BidActivity, default_increment: i64) -> i64 {
    lot.current_price() + required_increment(lot, activity, default_increment)
}
