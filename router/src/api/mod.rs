//! REST APIハンドラー
//!
//! OpenAI互換API（モデル一覧、補完プロキシ）

pub mod error;
pub mod models;
pub mod openai;
pub mod proxy;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// APIルーターを作成
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(models::list_models))
        .route("/v1/completions", post(openai::completions))
        .route("/v1/chat/completions", post(openai::chat_completions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
