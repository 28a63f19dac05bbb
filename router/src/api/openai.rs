//! OpenAI互換補完APIエンドポイント (/v1/completions, /v1/chat/completions)

use crate::api::{error::AppError, proxy::forward_streaming_response};
use crate::AppState;
use axum::{extract::State, response::Response, Json};
use llproxy_common::error::{CommonError, ProxyError};
use serde_json::{json, Value};
use tracing::{info, warn};

/// POST /v1/completions - 補完リクエストのプロキシ
pub async fn completions(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    proxy_completion(state, payload, "completions").await
}

/// POST /v1/chat/completions - チャット補完リクエストのプロキシ
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    proxy_completion(state, payload, "chat/completions").await
}

/// リクエストボディからmodelフィールド（エイリアス）を取り出す
fn extract_model(payload: &Value) -> Result<String, AppError> {
    payload
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::from(ProxyError::Common(CommonError::Validation(
                "request body must include a model field".to_string(),
            )))
        })
}

/// 補完リクエストを解決済みバックエンドへ転送する
///
/// エイリアス解決はスナップショット参照を1回読むだけで、転送中に
/// レジストリが差し替わっても進行中のリクエストには影響しない。
async fn proxy_completion(
    state: AppState,
    mut payload: Value,
    kind: &str,
) -> Result<Response, AppError> {
    let alias = extract_model(&payload)?;

    let model = state
        .registry
        .get(&alias)
        .await
        .ok_or_else(|| AppError::from(ProxyError::ModelNotFound(alias.clone())))?;

    // バックエンドが知っている識別子に書き換える。他フィールドは素通し
    payload["model"] = json!(model.upstream_id);

    let url = format!("{}/{}", model.backend, kind);
    let mut request = state.http_client.post(&url).json(&payload);
    if let Some(ref apikey) = model.apikey {
        request = request.header("Authorization", format!("Bearer {}", apikey));
    }

    info!(
        alias = %alias,
        upstream_id = %model.upstream_id,
        kind = kind,
        "Proxying completion request"
    );

    let response = request.send().await.map_err(|e| {
        warn!(alias = %alias, backend = %model.backend, error = %e, "Backend unreachable");
        AppError::from(ProxyError::UpstreamUnreachable(format!("{}: {}", url, e)))
    })?;

    // 非2xxもここでエラーにはせず、ステータス・ボディごとミラーする
    Ok(forward_streaming_response(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_model() {
        let payload = json!({"model": "llama:0", "prompt": "hi"});
        assert_eq!(extract_model(&payload).unwrap(), "llama:0");
    }

    #[test]
    fn test_extract_model_missing() {
        assert!(extract_model(&json!({"prompt": "hi"})).is_err());
    }

    #[test]
    fn test_extract_model_non_string() {
        assert!(extract_model(&json!({"model": 42})).is_err());
    }
}
