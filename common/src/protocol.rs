//! OpenAI互換プロトコル型
//!
//! バックエンドとの通信に使用するワイヤー型。バックエンド実装ごとに
//! フィールドの欠落があるため、寛容にデシリアライズできるよう
//! 全フィールドにデフォルトを持たせている。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GET /v1/models レスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelList {
    /// 固定値 "list"
    #[serde(default = "default_list_object")]
    pub object: String,
    /// モデル一覧
    #[serde(default)]
    pub data: Vec<ModelRecord>,
}

fn default_list_object() -> String {
    "list".to_string()
}

/// モデル一覧の1エントリ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    /// バックエンドにおけるモデル識別子
    pub id: String,
    /// 固定値 "model"
    #[serde(default = "default_model_object")]
    pub object: String,
    /// 作成時刻（UNIX秒）
    #[serde(default)]
    pub created: i64,
    /// モデルの所有者
    #[serde(default)]
    pub owned_by: String,
    /// バックエンド固有の追加メタデータ（ルーティングには関与しない）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

fn default_model_object() -> String {
    "model".to_string()
}

impl ModelRecord {
    /// idのみを持つ最小レコードを作成
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: default_model_object(),
            created: 0,
            owned_by: String::new(),
            meta: None,
        }
    }
}

/// Ollama `/api/ps` レスポンス（ロード済みモデル一覧）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaPsResponse {
    /// 現在ロードされているモデル
    #[serde(default)]
    pub models: Vec<OllamaPsModel>,
}

/// `/api/ps` の1エントリ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaPsModel {
    /// モデル名（例: "llama3.2:latest"）
    pub name: String,
}
