//! Integration Tests: モデル探索エンジン
//!
//! wiremockでバックエンドをスタブし、プローブ・タグ展開・フィルター・
//! 衝突解決・シングルフライトの動作を検証する。

use llproxy_common::config::EndpointSpec;
use llproxy_router::discovery::DiscoveryEngine;
use llproxy_router::registry::ModelRegistry;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url_spec(server: &MockServer) -> EndpointSpec {
    EndpointSpec {
        url: Some(server.uri()),
        ..EndpointSpec::default()
    }
}

async fn mount_models(server: &MockServer, ids: &[&str]) {
    let data: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 0, "owned_by": "org"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
        })))
        .mount(server)
        .await;
}

async fn registry_aliases(registry: &ModelRegistry) -> Vec<String> {
    registry
        .list()
        .await
        .into_iter()
        .map(|m| m.alias)
        .collect()
}

#[tokio::test]
async fn test_url_endpoint_discovery() {
    let server = MockServer::start().await;
    mount_models(&server, &["models/llama-3-8b.gguf"]).await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![url_spec(&server)]);

    assert!(engine.run_cycle().await);

    let model = registry.get("llama-3-8b").await.expect("model discovered");
    assert_eq!(model.upstream_id, "models/llama-3-8b.gguf");
    assert_eq!(model.backend, format!("{}/v1", server.uri()));
}

#[tokio::test]
async fn test_probe_sends_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "secured"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spec = EndpointSpec {
        apikey: Some("sk-test".to_string()),
        ..url_spec(&server)
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    let model = registry.get("secured").await.expect("model discovered");
    assert_eq!(model.apikey.as_deref(), Some("sk-test"));
}

#[tokio::test]
async fn test_tags_expand_aliases() {
    let server = MockServer::start().await;
    mount_models(&server, &["llama"]).await;

    let spec = EndpointSpec {
        tags: vec!["fast".to_string(), "gpu".to_string()],
        ..url_spec(&server)
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    assert_eq!(registry_aliases(&registry).await, vec!["llama:fast", "llama:gpu"]);
}

#[tokio::test]
async fn test_filter_drops_non_matching_aliases() {
    let server = MockServer::start().await;
    mount_models(&server, &["chat-7b", "embed-1"]).await;

    let spec = EndpointSpec {
        filter: vec!["chat".to_string()],
        ..url_spec(&server)
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    assert_eq!(registry_aliases(&registry).await, vec!["chat-7b"]);
}

#[tokio::test]
async fn test_static_models_skip_network_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let spec = EndpointSpec {
        models: vec!["vendor/static-model".to_string()],
        ..url_spec(&server)
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    let model = registry.get("static-model").await.expect("static model");
    assert_eq!(model.upstream_id, "vendor/static-model");
    server.verify().await;
}

#[tokio::test]
async fn test_failed_probe_yields_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![url_spec(&server)]);

    assert!(engine.run_cycle().await);
    assert!(registry.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_does_not_abort_cycle() {
    let server = MockServer::start().await;
    mount_models(&server, &["alive"]).await;

    // 1つ目は到達不能、2つ目は正常。サイクルは正常分を公開する
    let dead = EndpointSpec {
        url: Some("http://127.0.0.1:1".to_string()),
        ..EndpointSpec::default()
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![dead, url_spec(&server)]);
    engine.run_cycle().await;

    assert_eq!(registry_aliases(&registry).await, vec!["alive"]);
}

#[tokio::test]
async fn test_port_range_discovery() {
    let server = MockServer::start().await;
    mount_models(&server, &["ranged"]).await;

    let port = server.address().port();
    let spec = EndpointSpec {
        hostname: Some("127.0.0.1".to_string()),
        port_start: Some(port),
        port_end: Some(port),
        ..EndpointSpec::default()
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    let model = registry.get("ranged").await.expect("model discovered");
    assert_eq!(model.backend, format!("http://127.0.0.1:{}/v1", port));
}

#[tokio::test]
async fn test_collision_resolution_across_endpoints() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    mount_models(&first, &["llama"]).await;
    mount_models(&second, &["llama"]).await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(
        registry.clone(),
        vec![url_spec(&first), url_spec(&second)],
    );
    engine.run_cycle().await;

    assert_eq!(registry_aliases(&registry).await, vec!["llama:0", "llama:1"]);

    // 衝突後のエイリアスはそれぞれ元のバックエンドを指す
    let first_model = registry.get("llama:0").await.unwrap();
    assert_eq!(first_model.backend, format!("{}/v1", first.uri()));
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let server = MockServer::start().await;
    mount_models(&server, &["a", "b"]).await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![url_spec(&server)]);

    engine.run_cycle().await;
    let first = registry_aliases(&registry).await;
    engine.run_cycle().await;
    let second = registry_aliases(&registry).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_single_flight_skips_concurrent_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"object": "list", "data": [{"id": "slow"}]}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![url_spec(&server)]);

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 1本目が実行中のあいだの再トリガーはno-op
    assert!(!engine.run_cycle().await);
    assert!(running.await.unwrap());

    assert_eq!(registry_aliases(&registry).await, vec!["slow"]);
}

#[tokio::test]
async fn test_ollama_backend_reprobes_loaded_models() {
    let server = MockServer::start().await;
    // /v1/modelsはpull済み全件を返す
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"id": "llama3.2:latest", "owned_by": "library"},
                {"id": "qwen2.5:7b", "owned_by": "library"},
            ],
        })))
        .mount(&server)
        .await;
    // /api/psはロード済みモデルのみを返す
    Mock::given(method("GET"))
        .and(path("/api/ps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2:latest"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![url_spec(&server)]);
    engine.run_cycle().await;

    assert_eq!(registry_aliases(&registry).await, vec!["llama3.2:latest"]);
    server.verify().await;
}

#[tokio::test]
async fn test_disabled_endpoint_is_not_probed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let spec = EndpointSpec {
        enable: false,
        ..url_spec(&server)
    };
    let registry = ModelRegistry::new();
    let engine = DiscoveryEngine::new(registry.clone(), vec![spec]);
    engine.run_cycle().await;

    assert!(registry.snapshot().await.is_empty());
    server.verify().await;
}
