mod common;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use common::Fixture;
use live_auction_service::auth::{AuthError, Authenticator};
use live_auction_service::config::EngineConfig;
use live_auction_service::handlers::{
    handle_bid, handle_get_auction, handle_get_required_bid, AppState, BidRequest,
};
use serde_json::Value;
use std::sync::Arc;

/// 고정 토큰만 허용하는 인증기
struct StaticAuthenticator;

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        match token {
            "good-token" => Ok("user-42".to_string()),
            _ => Err(AuthError::InvalidToken),
        }
    }
}

fn state(fx: &Fixture) -> AppState {
    AppState {
        ctx: fx.ctx.clone(),
        auth: Arc::new(StaticAuthenticator),
    }
}

fn bearer(token: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// 입찰 API 성공
#[tokio::test]
async fn test_bid_endpoint_accepts_authenticated_bid() {
    let fx = Fixture::new();
    let (_, lot) = fx.running_live_auction().await;

    let response = handle_bid(
        State(state(&fx)),
        bearer("good-token"),
        Json(BidRequest {
            lot_id: lot.id,
            bid_amount: 1100,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Bid placed successfully!");
    assert_eq!(fx.lot(lot.id).current_bidder.as_deref(), Some("user-42"));
}

/// 검증 실패는 400과 오류 코드
#[tokio::test]
async fn test_bid_endpoint_maps_validation_failure_to_bad_request() {
    let fx = Fixture::new();
    let (_, lot) = fx.running_live_auction().await;

    let response = handle_bid(
        State(state(&fx)),
        bearer("good-token"),
        Json(BidRequest {
            lot_id: lot.id,
            bid_amount: 1050,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "LOW_BID");
    assert_eq!(body["required_bid"], 1100);
}

/// 잠금 대기 초과는 503과 BUSY
#[tokio::test]
async fn test_bid_endpoint_maps_busy_auction_to_service_unavailable() {
    let fx = Fixture::with_config(EngineConfig {
        lock_timeout: std::time::Duration::from_millis(20),
        ..EngineConfig::default()
    });
    let (auction, lot) = fx.running_live_auction().await;
    let _held = fx.ctx.lock_auction(auction.id).await.unwrap();

    let response = handle_bid(
        State(state(&fx)),
        bearer("good-token"),
        Json(BidRequest {
            lot_id: lot.id,
            bid_amount: 1100,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "BUSY");
    assert!(body.get("required_bid").is_none());
    assert!(fx.store.bids_for_lot(lot.id).is_empty());
}

#[tokio::test]
async fn test_bid_endpoint_requires_valid_token() {
    let fx = Fixture::new();
    let (_, lot) = fx.running_live_auction().await;
    let request = || {
        Json(BidRequest {
            lot_id: lot.id,
            bid_amount: 1100,
        })
    };

    let response = handle_bid(State(state(&fx)), HeaderMap::new(), request()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = handle_bid(State(state(&fx)), bearer("stolen"), request()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(fx.store.bids_for_lot(lot.id).is_empty());
}

#[test]
fn test_bid_request_uses_camel_case_fields() {
    let req: BidRequest = serde_json::from_str(r#"{"lotId": 7, "bidAmount": 1200}"#).unwrap();
    assert_eq!(req.lot_id, 7);
    assert_eq!(req.bid_amount, 1200);
}

#[tokio::test]
async fn test_query_endpoints() {
    let fx = Fixture::new();
    let (auction, lot) = fx.running_live_auction().await;

    let response = handle_get_auction(State(state(&fx)), Path(auction.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["current_lot"], lot.id);

    let response = handle_get_auction(State(state(&fx)), Path(9999)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = handle_get_required_bid(State(state(&fx)), Path(lot.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["required_bid"], 1100);

    let response = handle_get_required_bid(State(state(&fx)), Path(9999)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
