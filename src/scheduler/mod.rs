/// 경매 라이프사이클 스케줄러
/// 네 개의 주기 작업이 서로 독립적으로 돌며 저장소의 경매 상태를 전이시킨다.
/// 1. 활성화 (scheduled -> active)
/// 2. 인터미션 종료 (intermission -> active)
/// 3. 진행중 경매 틱 (로트 만료, 비활동 누적)
/// 4. 타임드 경매 종료 (active -> completed)
// region:    --- Imports
use crate::context::EngineContext;
use crate::guard::GuardError;
use crate::store::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

mod sweeps;

pub use sweeps::{
    run_activation_sweep, run_active_tick, run_intermission_sweep, run_timed_conclusion_sweep,
};
// endregion: --- Imports

// region:    --- Sweep Report
/// 스윕 1회 실행 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub transitioned: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Transitioned,
    /// Re-read state no longer matched the sweep, or nothing was due.
    Skipped,
}

#[derive(Debug, Error)]
pub(crate) enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Busy(#[from] GuardError),
}

impl SweepReport {
    pub(crate) fn record(
        &mut self,
        sweep: &str,
        auction_id: i64,
        result: Result<Outcome, SweepError>,
    ) {
        match result {
            Ok(Outcome::Transitioned) => self.transitioned += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(SweepError::Busy(e)) => {
                warn!("{:<12} --> {} 건너뜀: {}", "Scheduler", sweep, e);
                self.skipped += 1;
            }
            Err(SweepError::Store(StoreError::Conflict { .. })) => {
                warn!(
                    "{:<12} --> {} 버전 충돌로 건너뜀 auction={}",
                    "Scheduler", sweep, auction_id
                );
                self.skipped += 1;
            }
            Err(SweepError::Store(e)) => {
                error!(
                    "{:<12} --> {} 처리 중 오류 auction={}: {}",
                    "Scheduler", sweep, auction_id, e
                );
                self.failed += 1;
            }
        }
    }
}
// endregion: --- Sweep Report

// region:    --- Lifecycle Scheduler
/// 경매 라이프사이클 스케줄러
pub struct LifecycleScheduler {
    ctx: EngineContext,
}

impl LifecycleScheduler {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 모든 스윕 시작
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let config = &self.ctx.config;
        vec![
            spawn_sweep(
                self.ctx.clone(),
                "activation",
                config.activation_interval,
                |ctx| async move { run_activation_sweep(&ctx).await },
            ),
            spawn_sweep(
                self.ctx.clone(),
                "intermission",
                config.intermission_interval,
                |ctx| async move { run_intermission_sweep(&ctx).await },
            ),
            spawn_sweep(
                self.ctx.clone(),
                "active-tick",
                config.active_tick_interval,
                |ctx| async move { run_active_tick(&ctx).await },
            ),
            spawn_sweep(
                self.ctx.clone(),
                "timed-close",
                config.timed_conclusion_interval,
                |ctx| async move { run_timed_conclusion_sweep(&ctx).await },
            ),
        ]
    }
}

fn spawn_sweep<F, Fut>(
    ctx: EngineContext,
    name: &'static str,
    period: Duration,
    sweep: F,
) -> JoinHandle<()>
where
    F: Fn(EngineContext) -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<SweepReport>> + Send + 'static,
{
    tokio::spawn(async move {
        info!("{:<12} --> {} 스윕 시작 (주기 {:?})", "Scheduler", name, period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep(ctx.clone()).await {
                Ok(report) => {
                    debug!("{:<12} --> {} 스윕 완료: {:?}", "Scheduler", name, report)
                }
                Err(e) => error!(
                    "{:<12} --> {} 스윕 후보 조회 실패: {}",
                    "Scheduler", name, e
                ),
            }
        }
    })
}
// endregion: --- Lifecycle Scheduler
