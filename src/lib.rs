pub mod auction;
pub mod auth;
pub mod bidding;
pub mod config;
pub mod context;
pub mod database;
pub mod guard;
pub mod handlers;
pub mod message_broker;
pub mod scheduler;
pub mod store;
