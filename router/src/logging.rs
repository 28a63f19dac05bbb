//! ロギング初期化ユーティリティ

use tracing_subscriber::EnvFilter;

/// tracingサブスクライバーを初期化する
///
/// フィルターは `LLPROXY_LOG_LEVEL` → `RUST_LOG` → "info" の順で決定。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = std::env::var("LLPROXY_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .try_init()?;

    Ok(())
}
