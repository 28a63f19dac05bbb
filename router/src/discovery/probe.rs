//! バックエンドプローバー
//!
//! 候補バックエンド1件に対して `/models` プローブを実行し、
//! 公開可能なDiscoveredModelの集合を導出する。

use crate::registry::{DiscoveredModel, ModelMetadata};
use llproxy_common::config::EndpointSpec;
use llproxy_common::error::{ProxyError, ProxyResult};
use llproxy_common::protocol::{ModelList, ModelRecord, OllamaPsResponse};
use reqwest::Client;
use tracing::debug;

/// エイリアス導出時に除去するモデルファイル拡張子
const KNOWN_MODEL_EXTENSIONS: &[&str] = &["gguf", "ggml", "bin", "safetensors"];

/// バックエンド固有の正規化フック
///
/// owned_by値で識別する明示的なテーブル。2例から一般規則を推測しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VendorQuirk {
    /// Ollama互換: `/v1/models`はpull済みモデルを全件返すため、
    /// ネイティブの`/api/ps`でロード済みモデルを取り直す
    ReprobeLoadedModels,
    /// Azureデプロイメント一覧: idがデプロイ名そのものなので正規化しない
    UseIdVerbatim,
}

fn vendor_quirk(owned_by: &str) -> Option<VendorQuirk> {
    match owned_by {
        "library" => Some(VendorQuirk::ReprobeLoadedModels),
        "azure-openai" => Some(VendorQuirk::UseIdVerbatim),
        _ => None,
    }
}

/// 設定されたURLをバージョンプレフィックス付きのベースURLへ正規化する
///
/// 例: "http://gpu01:8000" → "http://gpu01:8000/v1"
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// upstream idから公開用のベース名を導出する
///
/// パスの最終セグメントを取り、既知のモデルファイル拡張子を除去し、
/// 空白をハイフンに正規化する。
fn derive_model_name(upstream_id: &str) -> String {
    let segment = upstream_id.rsplit('/').next().unwrap_or(upstream_id);
    let stem = match segment.rsplit_once('.') {
        Some((stem, ext))
            if KNOWN_MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) =>
        {
            stem
        }
        _ => segment,
    };
    stem.replace(' ', "-")
}

/// 1バックエンドをプローブし、公開可能なモデル集合を返す
///
/// 失敗は常にローカルで回復する: ネットワークエラー・非2xx応答は
/// ログに残して空集合を返し、探索サイクル全体を中断しない。
pub async fn probe_backend(
    client: &Client,
    base_url: &str,
    spec: &EndpointSpec,
) -> Vec<DiscoveredModel> {
    let records = if spec.models.is_empty() {
        match fetch_model_records(client, base_url, spec.apikey.as_deref()).await {
            Ok(records) => records,
            Err(e) => {
                debug!(backend = base_url, error = %e, "No models found at backend");
                return Vec::new();
            }
        }
    } else {
        // 静的オーバーライド: ネットワークプローブを行わない
        spec.models
            .iter()
            .map(|id| ModelRecord::from_id(id.clone()))
            .collect()
    };

    expand_records(records, base_url, spec)
}

/// `/models` を取得し、ベンダー固有の補正を適用したレコード一覧を返す
async fn fetch_model_records(
    client: &Client,
    base_url: &str,
    apikey: Option<&str>,
) -> ProxyResult<Vec<ModelRecord>> {
    let url = format!("{}/models", base_url);
    let mut request = client.get(&url);
    if let Some(key) = apikey {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| ProxyError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ProxyError::Http(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    let list: ModelList = response
        .json()
        .await
        .map_err(|e| ProxyError::Http(format!("malformed /models response: {}", e)))?;

    // 先頭レコードのowned_byでバックエンド種別を判定
    if let Some(first) = list.data.first() {
        if vendor_quirk(&first.owned_by) == Some(VendorQuirk::ReprobeLoadedModels) {
            return fetch_loaded_models(client, base_url, &first.owned_by).await;
        }
    }

    Ok(list.data)
}

/// Ollamaネイティブの `/api/ps` からロード済みモデルを取得する
async fn fetch_loaded_models(
    client: &Client,
    base_url: &str,
    owned_by: &str,
) -> ProxyResult<Vec<ModelRecord>> {
    // /api/psはバージョンプレフィックスの外に生える
    let root = base_url.trim_end_matches("/v1");
    let url = format!("{}/api/ps", root);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ProxyError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ProxyError::Http(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    let ps: OllamaPsResponse = response
        .json()
        .await
        .map_err(|e| ProxyError::Http(format!("malformed /api/ps response: {}", e)))?;

    debug!(backend = base_url, loaded = ps.models.len(), "Re-probed loaded models");

    Ok(ps
        .models
        .into_iter()
        .map(|m| ModelRecord {
            owned_by: owned_by.to_string(),
            ..ModelRecord::from_id(m.name)
        })
        .collect())
}

/// レコード一覧をタグ展開・フィルターしてDiscoveredModelへ変換する
fn expand_records(
    records: Vec<ModelRecord>,
    base_url: &str,
    spec: &EndpointSpec,
) -> Vec<DiscoveredModel> {
    let mut discovered = Vec::new();

    for record in records {
        let base_name = match vendor_quirk(&record.owned_by) {
            Some(VendorQuirk::UseIdVerbatim) => record.id.clone(),
            _ => derive_model_name(&record.id),
        };

        // 空idや末尾スラッシュのidは空の名前になる。空エイリアスは
        // 解決不能なので公開しない
        if base_name.is_empty() {
            debug!(
                backend = base_url,
                upstream_id = %record.id,
                "Skipping model record with empty derived name"
            );
            continue;
        }

        let aliases: Vec<String> = if spec.tags.is_empty() {
            vec![base_name]
        } else {
            spec.tags
                .iter()
                .map(|tag| format!("{}:{}", base_name, tag))
                .collect()
        };

        for alias in aliases {
            if !spec.filter.is_empty() && !spec.filter.iter().any(|f| alias.contains(f.as_str())) {
                continue;
            }

            // 名前付きフィールドのみを複製する（任意フィールドの転記はしない）
            discovered.push(DiscoveredModel {
                alias,
                backend: base_url.to_string(),
                upstream_id: record.id.clone(),
                apikey: spec.apikey.clone(),
                metadata: ModelMetadata {
                    object: record.object.clone(),
                    created: record.created,
                    owned_by: record.owned_by.clone(),
                    meta: record.meta.clone(),
                },
            });
        }
    }

    if discovered.is_empty() {
        debug!(backend = base_url, "Backend exposed no matching models");
    } else {
        debug!(
            backend = base_url,
            models = discovered.len(),
            "Probed backend"
        );
    }

    discovered
}
