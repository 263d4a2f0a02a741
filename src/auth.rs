//! Bearer token resolution.
// region:    --- Imports
use crate::auction::model::UserId;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, warn};
// endregion: --- Imports

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication token is required")]
    MissingToken,
    #[error("authentication failed or token invalid")]
    InvalidToken,
}

/// 토큰 -> 사용자 id 확인 트레이트
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// `Authorization: Bearer <token>` 헤더에서 토큰 추출
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

// region:    --- Identity Service
#[derive(Debug, Deserialize)]
struct MeResponse {
    data: MeData,
}

#[derive(Debug, Deserialize)]
struct MeData {
    id: String,
}

/// 외부 인증 서비스의 `/users/me` 로 토큰을 확인
pub struct IdentityServiceAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityServiceAuthenticator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Authenticator for IdentityServiceAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let response = self
            .client
            .get(format!("{}/users/me", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!("{:<12} --> 인증 서비스 요청 실패: {}", "Auth", e);
                AuthError::InvalidToken
            })?;

        if !response.status().is_success() {
            warn!(
                "{:<12} --> 토큰 확인 실패: status={}",
                "Auth",
                response.status()
            );
            return Err(AuthError::InvalidToken);
        }

        let me: MeResponse = response.json().await.map_err(|e| {
            error!("{:<12} --> 사용자 정보 응답 파싱 실패: {}", "Auth", e);
            AuthError::InvalidToken
        })?;
        Ok(me.data.id)
    }
}
// endregion: --- Identity Service
