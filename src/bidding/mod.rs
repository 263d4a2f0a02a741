pub mod commands;
pub mod error;
pub mod increment;

pub use commands::{get_required_bid, handle_place_bid, BidReceipt, PlaceBidCommand, RequiredBid};
pub use error::BidError;
