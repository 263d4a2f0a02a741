//! Shared handles for the bid processor and the lifecycle sweeps.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, EventPublisher};
use crate::config::EngineConfig;
use crate::guard::{AuctionGuard, AuctionLocks, GuardError};
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::warn;
// endregion: --- Imports

// region:    --- Clock
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
// endregion: --- Clock

// region:    --- Engine Context
/// 엔진 공유 컨텍스트
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn RecordStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub locks: AuctionLocks,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            locks: AuctionLocks::new(),
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn lock_auction(
        &self,
        auction_id: crate::auction::model::AuctionId,
    ) -> Result<AuctionGuard, GuardError> {
        self.locks
            .acquire(auction_id, self.config.lock_timeout)
            .await
    }

    /// Publish events collected during one locked cycle. Call only after the
    /// auction guard has been dropped.
    pub async fn publish_all(&self, events: Vec<AuctionEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Best effort: the write the event describes is already committed.
    pub async fn publish(&self, event: AuctionEvent) {
        let event_type = event.event_type();
        let auction_id = event.auction_id();
        if let Err(e) = self.publisher.publish(event).await {
            warn!(
                "{:<12} --> {} 이벤트 발행 실패 auction={}: {}",
                "Event", event_type, auction_id, e
            );
        }
    }
}
// endregion: --- Engine Context
