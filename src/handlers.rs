// region:    --- Imports
use crate::auction::model::{AuctionId, LotId};
use crate::auth::{bearer_token, AuthError, Authenticator};
use crate::bidding::{get_required_bid, handle_place_bid, BidError, PlaceBidCommand};
use crate::context::EngineContext;
use crate::store::StoreError;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub ctx: EngineContext,
    pub auth: Arc<dyn Authenticator>,
}

/// 라우터 설정
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/bid", post(handle_bid))
        .route("/api/auctions/:id", get(handle_get_auction))
        .route("/api/lots/:id", get(handle_get_lot))
        .route("/api/lots/:id/required-bid", get(handle_get_required_bid))
        .with_state(state)
}
// endregion: --- App State

// region:    --- Command Handlers

/// 입찰 요청 바디
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub lot_id: LotId,
    pub bid_amount: i64,
}

/// 입찰 요청 처리
pub async fn handle_bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BidRequest>,
) -> Response {
    let bidder_id = match authenticate(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(e) => return auth_error(e),
    };
    info!(
        "{:<12} --> 입찰 요청: lot={} amount={} bidder={}",
        "Command", req.lot_id, req.bid_amount, bidder_id
    );

    let cmd = PlaceBidCommand {
        lot_id: req.lot_id,
        bid_amount: req.bid_amount,
        bidder_id,
    };
    match handle_place_bid(cmd, &state.ctx).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => bid_error(e),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 상태 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
) -> Response {
    match state.ctx.store.read_auction(id).await {
        Ok(auction) => (StatusCode::OK, Json(auction)).into_response(),
        Err(e) => store_error(e),
    }
}

/// 상품 조회
pub async fn handle_get_lot(State(state): State<AppState>, Path(id): Path<LotId>) -> Response {
    match state.ctx.store.read_lot(id).await {
        Ok(lot) => (StatusCode::OK, Json(lot)).into_response(),
        Err(e) => store_error(e),
    }
}

/// 다음 최소 입찰가 조회
pub async fn handle_get_required_bid(
    State(state): State<AppState>,
    Path(id): Path<LotId>,
) -> Response {
    match get_required_bid(id, &state.ctx).await {
        Ok(required) => (StatusCode::OK, Json(required)).into_response(),
        Err(BidError::NotFound(what)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("{} not found", what), "code": "NOT_FOUND" })),
        )
            .into_response(),
        Err(e) => bid_error(e),
    }
}

pub async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// endregion: --- Query Handlers

// region:    --- Helpers
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, AuthError> {
    let token = bearer_token(headers)?;
    state.auth.authenticate(token).await
}

fn auth_error(e: AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": e.to_string(), "code": "UNAUTHORIZED" })),
    )
        .into_response()
}

/// 입찰 오류 -> HTTP 응답 (검증 실패 400, 인프라 오류 503)
pub fn bid_error(e: BidError) -> Response {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let mut body = serde_json::json!({
        "error": e.to_string(),
        "code": e.code(),
    });
    if let BidError::BelowMinimum { required } = e {
        body["required_bid"] = serde_json::json!(required);
    }
    (status, Json(body)).into_response()
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string(), "code": "NOT_FOUND" })),
        )
            .into_response(),
        other => {
            error!("{:<12} --> 조회 실패: {}", "Query", other);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": other.to_string(), "code": "STORE_UNAVAILABLE" })),
            )
                .into_response()
        }
    }
}
// endregion: --- Helpers
