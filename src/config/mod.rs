//! Engine tunables and process options.
// region:    --- Imports
use clap::{Args, Parser};
use std::net::SocketAddr;
use std::time::Duration;
// endregion: --- Imports

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_EVENTS_TOPIC: &str = "auction-events";

// region:    --- Engine Config
/// 경매 엔진 설정
///
/// Every time threshold and counter limit the bidding and lifecycle logic
/// consults. `Default` reproduces the production constants.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Lot countdown restarted by activation, intermission exit and every live bid.
    pub base_timer_duration: Duration,
    /// Pause between two lots.
    pub grace_period_duration: Duration,
    pub inactivity_threshold: Duration,
    /// Remaining-clock threshold under which bursts escalate the increment.
    pub high_activity_threshold: Duration,
    pub high_activity_bid_count: usize,
    pub max_inactivity_periods: i32,
    pub max_activity_level: i32,
    /// Bids older than this drop out of the recent-bid window.
    pub recent_bid_window: Duration,
    /// The active tick leaves alone auctions touched this recently.
    pub activity_debounce: Duration,
    pub default_increment: i64,
    pub default_extension_minutes: i64,
    pub store_timeout: Duration,
    pub lock_timeout: Duration,
    pub max_write_retries: u32,
    pub activation_interval: Duration,
    pub intermission_interval: Duration,
    pub active_tick_interval: Duration,
    pub timed_conclusion_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_timer_duration: Duration::from_secs(30),
            grace_period_duration: Duration::from_secs(30),
            inactivity_threshold: Duration::from_secs(10),
            high_activity_threshold: Duration::from_secs(10),
            high_activity_bid_count: 3,
            max_inactivity_periods: 3,
            max_activity_level: 2,
            recent_bid_window: Duration::from_secs(15),
            activity_debounce: Duration::from_secs(2),
            default_increment: 100,
            default_extension_minutes: 5,
            store_timeout: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(10),
            max_write_retries: 5,
            activation_interval: Duration::from_secs(15),
            intermission_interval: Duration::from_secs(15),
            active_tick_interval: Duration::from_secs(1),
            timed_conclusion_interval: Duration::from_secs(60),
        }
    }
}

/// Convert a configured span into calendar arithmetic.
pub fn span(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(i64::MAX / 1_000))
}
// endregion: --- Engine Config

// region:    --- Command Line
#[derive(Parser, Debug, Clone)]
#[command(name = "live-auction-service")]
#[command(about = "Live and timed auction bidding and lifecycle engine")]
pub struct RunOptions {
    /// Postgres connection string.
    #[arg(long = "database-url")]
    #[arg(env = "DATABASE_URL")]
    pub database_url: String,

    /// Address and port the HTTP server binds to.
    #[arg(long = "listen-addr")]
    #[arg(default_value = DEFAULT_LISTEN_ADDR)]
    #[arg(env = "LISTEN_ADDR")]
    pub listen_addr: SocketAddr,

    /// Kafka bootstrap servers. Events are only logged when unset.
    #[arg(long = "kafka-brokers")]
    #[arg(env = "KAFKA_BROKERS")]
    pub kafka_brokers: Option<String>,

    #[arg(long = "events-topic")]
    #[arg(default_value = DEFAULT_EVENTS_TOPIC)]
    #[arg(env = "EVENTS_TOPIC")]
    pub events_topic: String,

    /// Base url of the identity service resolving bearer tokens.
    #[arg(long = "identity-url")]
    #[arg(env = "IDENTITY_URL")]
    pub identity_url: String,

    #[command(flatten)]
    pub engine: EngineOptions,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Engine Options")]
pub struct EngineOptions {
    #[arg(long, env = "BASE_TIMER_SECS", default_value_t = 30)]
    pub base_timer_secs: u64,
    #[arg(long, env = "GRACE_PERIOD_SECS", default_value_t = 30)]
    pub grace_period_secs: u64,
    #[arg(long, env = "INACTIVITY_THRESHOLD_SECS", default_value_t = 10)]
    pub inactivity_threshold_secs: u64,
    #[arg(long, env = "HIGH_ACTIVITY_THRESHOLD_SECS", default_value_t = 10)]
    pub high_activity_threshold_secs: u64,
    #[arg(long, env = "HIGH_ACTIVITY_BID_COUNT", default_value_t = 3)]
    pub high_activity_bid_count: usize,
    #[arg(long, env = "MAX_INACTIVITY_PERIODS", default_value_t = 3)]
    pub max_inactivity_periods: i32,
    #[arg(long, env = "MAX_ACTIVITY_LEVEL", default_value_t = 2)]
    pub max_activity_level: i32,
    #[arg(long, env = "RECENT_BID_WINDOW_SECS", default_value_t = 15)]
    pub recent_bid_window_secs: u64,
    #[arg(long, env = "ACTIVITY_DEBOUNCE_MS", default_value_t = 2000)]
    pub activity_debounce_ms: u64,
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 5000)]
    pub store_timeout_ms: u64,
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 10000)]
    pub lock_timeout_ms: u64,
    #[arg(long, env = "MAX_WRITE_RETRIES", default_value_t = 5)]
    pub max_write_retries: u32,
    #[arg(long, env = "ACTIVATION_INTERVAL_SECS", default_value_t = 15)]
    pub activation_interval_secs: u64,
    #[arg(long, env = "INTERMISSION_INTERVAL_SECS", default_value_t = 15)]
    pub intermission_interval_secs: u64,
    #[arg(long, env = "ACTIVE_TICK_INTERVAL_MS", default_value_t = 1000)]
    pub active_tick_interval_ms: u64,
    #[arg(long, env = "TIMED_CONCLUSION_INTERVAL_SECS", default_value_t = 60)]
    pub timed_conclusion_interval_secs: u64,
}

impl From<EngineOptions> for EngineConfig {
    fn from(o: EngineOptions) -> Self {
        Self {
            base_timer_duration: Duration::from_secs(o.base_timer_secs),
            grace_period_duration: Duration::from_secs(o.grace_period_secs),
            inactivity_threshold: Duration::from_secs(o.inactivity_threshold_secs.max(1)),
            high_activity_threshold: Duration::from_secs(o.high_activity_threshold_secs),
            high_activity_bid_count: o.high_activity_bid_count,
            max_inactivity_periods: o.max_inactivity_periods,
            max_activity_level: o.max_activity_level,
            recent_bid_window: Duration::from_secs(o.recent_bid_window_secs),
            activity_debounce: Duration::from_millis(o.activity_debounce_ms),
            store_timeout: Duration::from_millis(o.store_timeout_ms),
            lock_timeout: Duration::from_millis(o.lock_timeout_ms),
            max_write_retries: o.max_write_retries,
            activation_interval: Duration::from_secs(o.activation_interval_secs.max(1)),
            intermission_interval: Duration::from_secs(o.intermission_interval_secs.max(1)),
            active_tick_interval: Duration::from_millis(o.active_tick_interval_ms.max(1)),
            timed_conclusion_interval: Duration::from_secs(
                o.timed_conclusion_interval_secs.max(1),
            ),
            ..EngineConfig::default()
        }
    }
}
// endregion: --- Command Line
