//! LLProxy共通ライブラリ
//!
//! 設定・エラー型・OpenAI互換プロトコル型を提供

#![warn(missing_docs)]

/// 設定構造体（ProxyConfig, EndpointSpec）
pub mod config;

/// エラー型定義
pub mod error;

/// OpenAI互換プロトコル型
pub mod protocol;
