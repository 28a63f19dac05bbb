//! LLProxy Server Entry Point

use clap::Parser;
use llproxy_common::config::ProxyConfig;
use llproxy_router::cli::Cli;
use llproxy_router::discovery::DiscoveryEngine;
use llproxy_router::registry::ModelRegistry;
use llproxy_router::{api, logging, AppState};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init().expect("failed to initialize logging");

    let config = match ProxyConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };

    // 環境変数でバインド設定を上書き可能
    let host = std::env::var("LLPROXY_HOST").unwrap_or_else(|_| config.host.clone());
    let port = std::env::var("LLPROXY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.port);

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), config.endpoints.clone());

    // 起動直後に初回探索を行い、以降は設定間隔で周期実行する。
    // タイマーはエンジンではなく呼び出し側が所有する。
    let interval_secs = config.discovery_interval_secs;
    let ticker_engine = engine.clone();
    tokio::spawn(async move {
        ticker_engine.run_cycle().await;

        let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
        // intervalの初回tickは即時発火するため読み捨てる
        timer.tick().await;
        loop {
            timer.tick().await;
            ticker_engine.run_cycle().await;
        }
    });

    let state = AppState {
        registry,
        http_client: reqwest::Client::new(),
    };
    let app = api::create_router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %bind_addr, "LLProxy listening");

    axum::serve(listener, app).await.expect("Server error");
}
