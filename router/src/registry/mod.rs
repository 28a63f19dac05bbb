//! モデルレジストリ
//!
//! 探索済みモデルをメモリ内で管理する。スナップショットは探索サイクル
//! 完了時に丸ごと差し替えられ、読み手が更新途中の状態を観測することはない。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// モデル一覧表示用のパススルーメタデータ
///
/// ルーティングには関与しない。バックエンドの `/models` レスポンスから
/// 名前付きフィールドのみを複製する（任意フィールドの転記はしない）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelMetadata {
    /// 固定値 "model"
    pub object: String,
    /// 作成時刻（UNIX秒）
    pub created: i64,
    /// モデルの所有者
    pub owned_by: String,
    /// バックエンド固有の追加メタデータ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// 探索済みモデル
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredModel {
    /// 外部公開用のエイリアス（公開スナップショット内で一意）
    pub alias: String,
    /// リクエスト転送先のベースURL（正規化済み、例: "http://gpu01:8000/v1"）
    pub backend: String,
    /// バックエンドにおけるモデル識別子
    pub upstream_id: String,
    /// バックエンドへ転送するBearerトークン
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,
    /// パススルーメタデータ
    pub metadata: ModelMetadata,
}

/// モデルレジストリ
///
/// 現在のスナップショットを`Arc`で保持し、`publish`で丸ごと差し替える。
/// 読み手は`Arc`のクローンを取得するだけなので書き手とブロックし合わない。
#[derive(Clone)]
pub struct ModelRegistry {
    models: Arc<RwLock<Arc<HashMap<String, DiscoveredModel>>>>,
}

impl ModelRegistry {
    /// 空のレジストリを作成
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// 新しいスナップショットを公開する
    ///
    /// 差し替えは参照の付け替え1回で完結し、読み手が構築途中の
    /// 一覧を観測することはない。
    pub async fn publish(&self, models: Vec<DiscoveredModel>) {
        let count = models.len();
        let snapshot: HashMap<String, DiscoveredModel> = models
            .into_iter()
            .map(|model| (model.alias.clone(), model))
            .collect();

        let mut current = self.models.write().await;
        *current = Arc::new(snapshot);
        drop(current);

        info!(models = count, "Published new model registry snapshot");
    }

    /// 現在のスナップショットへの参照を取得
    pub async fn snapshot(&self) -> Arc<HashMap<String, DiscoveredModel>> {
        self.models.read().await.clone()
    }

    /// エイリアスでモデルを解決
    pub async fn get(&self, alias: &str) -> Option<DiscoveredModel> {
        self.models.read().await.get(alias).cloned()
    }

    /// 全モデルをエイリアス順で取得（一覧API用）
    pub async fn list(&self) -> Vec<DiscoveredModel> {
        let snapshot = self.snapshot().await;
        let mut models: Vec<DiscoveredModel> = snapshot.values().cloned().collect();
        models.sort_by(|a, b| a.alias.cmp(&b.alias));
        models
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
