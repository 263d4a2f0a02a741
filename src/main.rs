// region:    --- Imports
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use live_auction_service::auction::events::{EventPublisher, LogPublisher};
use live_auction_service::auth::IdentityServiceAuthenticator;
use live_auction_service::config::{EngineConfig, RunOptions};
use live_auction_service::context::EngineContext;
use live_auction_service::database::{DatabaseManager, PgRecordStore};
use live_auction_service::handlers::{self, AppState};
use live_auction_service::message_broker::{KafkaEventPublisher, KafkaManager};
use live_auction_service::scheduler::LifecycleScheduler;
use live_auction_service::store::{RecordStore, TimeoutStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let opts = RunOptions::parse();
    let config = EngineConfig::from(opts.engine.clone());

    // 데이터베이스 초기화
    let db_manager = DatabaseManager::new(&opts.database_url)
        .await
        .context("데이터베이스 연결 실패")?;
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    let store: Arc<dyn RecordStore> = Arc::new(TimeoutStore::new(
        PgRecordStore::new(db_manager.get_pool()),
        config.store_timeout,
    ));

    // 이벤트 발행자 (Kafka 브로커가 없으면 로그로만 남김)
    let publisher: Arc<dyn EventPublisher> = match &opts.kafka_brokers {
        Some(brokers) => {
            let kafka_manager = KafkaManager::new(brokers).context("Kafka 프로듀서 생성 실패")?;
            if let Err(e) = kafka_manager.create_topic(&opts.events_topic, 5, 1).await {
                warn!("{:<12} --> 토픽 생성 건너뜀: {}", "Main", e);
            }
            info!("{:<12} --> Kafka 초기화 성공", "Main");
            Arc::new(KafkaEventPublisher::new(
                kafka_manager.get_producer(),
                opts.events_topic.clone(),
            ))
        }
        None => {
            info!("{:<12} --> Kafka 미설정, 이벤트는 로그로만 기록", "Main");
            Arc::new(LogPublisher)
        }
    };

    let ctx = EngineContext::new(store, publisher, config);

    // 라이프사이클 스케줄러 시작
    let scheduler = LifecycleScheduler::new(ctx.clone());
    let _sweeps = scheduler.start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        ctx,
        auth: Arc::new(IdentityServiceAuthenticator::new(opts.identity_url.clone())),
    };
    let routes_all = handlers::router(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let listener = TcpListener::bind(opts.listen_addr)
        .await
        .with_context(|| format!("{} 바인딩 실패", opts.listen_addr))?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
