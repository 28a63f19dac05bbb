//! モデル一覧API (GET /v1/models)

use crate::AppState;
use axum::{extract::State, Json};
use llproxy_common::protocol::{ModelList, ModelRecord};

/// GET /v1/models - レジストリの全エイリアスをOpenAI互換形式で返す
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let data: Vec<ModelRecord> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|model| ModelRecord {
            id: model.alias,
            object: model.metadata.object,
            created: model.metadata.created,
            owned_by: model.metadata.owned_by,
            meta: model.metadata.meta,
        })
        .collect();

    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}
