//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use axum::{http::StatusCode, response::IntoResponse, Json};
use llproxy_common::error::ProxyError;
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub ProxyError);

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // external_message()で内部情報（バックエンドアドレス等）の露出を防ぐ。
        // 詳細はハンドラー側で別途ログに残す。
        let status = match &self.0 {
            ProxyError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Http(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Ssh(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Common(_) => StatusCode::BAD_REQUEST,
        };

        let payload = json!({
            "error": self.0.external_message()
        });

        (status, Json(payload)).into_response()
    }
}
