//! LLProxy Router
//!
//! ローカル/リモートの推論サーバーを探索し、統合モデルカタログを
//! 公開してOpenAI互換リクエストを正しいバックエンドへ中継する

#![warn(missing_docs)]

/// REST APIハンドラー
pub mod api;

/// CLIインターフェース
pub mod cli;

/// モデル探索エンジン
pub mod discovery;

/// ロギング初期化ユーティリティ
pub mod logging;

/// モデルレジストリ
pub mod registry;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// モデルレジストリ
    pub registry: registry::ModelRegistry,
    /// 共有HTTPクライアント（接続プーリング有効）
    pub http_client: reqwest::Client,
}
