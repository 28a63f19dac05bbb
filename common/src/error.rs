//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `ProxyError`は`external_message()`を提供し、内部情報（バックエンドの
//! アドレス等）を外部クライアントに露出しないレスポンスを生成できる。

use thiserror::Error;

/// 共通レイヤーのエラー型
#[derive(Debug, Error)]
pub enum CommonError {
    /// 設定エラー
    #[error("Configuration error: {0}")]
    Config(String),

    /// シリアライゼーションエラー
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// バリデーションエラー
    #[error("Validation error: {0}")]
    Validation(String),
}

/// 共通レイヤーのResult型
pub type CommonResult<T> = Result<T, CommonError>;

/// プロキシのエラー型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 共通レイヤーのエラー
    #[error(transparent)]
    Common(#[from] CommonError),

    /// エイリアスがレジストリに存在しない
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// 解決済みバックエンドが応答しなかった
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// HTTPクライアントエラー
    #[error("HTTP client error: {0}")]
    Http(String),

    /// SSH接続・コマンド実行エラー
    #[error("SSH error: {0}")]
    Ssh(String),

    /// タイムアウト
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 内部エラー
    #[error("Internal error: {0}")]
    Internal(String),
}

/// プロキシのResult型
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// 外部クライアント向けの安全なエラーメッセージを返す
    ///
    /// バックエンドのIPアドレス・ポート番号等の内部情報を含まない
    /// 文言のみを返す。HTTPレスポンスにはこちらを使用すること。
    pub fn external_message(&self) -> String {
        match self {
            ProxyError::ModelNotFound(_) => "Model not found".to_string(),
            ProxyError::UpstreamUnreachable(_) => "Error proxying request".to_string(),
            ProxyError::Http(_) => "Upstream request failed".to_string(),
            ProxyError::Ssh(_) => "Internal server error".to_string(),
            ProxyError::Timeout(_) => "Upstream request timed out".to_string(),
            ProxyError::Internal(_) => "Internal server error".to_string(),
            ProxyError::Common(_) => "Invalid request".to_string(),
        }
    }
}
