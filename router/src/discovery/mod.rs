//! モデル探索エンジン
//!
//! 全エンドポイント定義を並行プローブし、エイリアス衝突を解決して
//! モデルレジストリへ新スナップショットを公開する。
//! サイクルは同時に1本のみ実行される（多重トリガーはno-op）。

pub mod probe;
pub mod ssh;

use crate::registry::{DiscoveredModel, ModelRegistry};
use futures::future::join_all;
use llproxy_common::config::{DiscoveryMode, EndpointSpec};
use llproxy_common::error::{ProxyError, ProxyResult};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// プローブ1回あたりのタイムアウト（秒）
///
/// 到達不能ホスト1台がサイクル全体を停滞させないための上限。
const PROBE_TIMEOUT_SECS: u64 = 5;

/// モデル探索エンジン
///
/// エンドポイント定義はサイクルをまたいで不変。周期実行のタイマーは
/// 呼び出し側（main）が所有し、エンジン自身は時間管理をしない。
#[derive(Clone)]
pub struct DiscoveryEngine {
    registry: ModelRegistry,
    endpoints: Arc<Vec<EndpointSpec>>,
    client: Client,
    in_flight: Arc<AtomicBool>,
}

/// サイクル終了時（エラー時含む）にシングルフライトのフラグを戻すガード
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DiscoveryEngine {
    /// 新しいエンジンを作成
    pub fn new(registry: ModelRegistry, endpoints: Vec<EndpointSpec>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            registry,
            endpoints: Arc::new(endpoints),
            client,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 探索サイクルを1回実行する
    ///
    /// 実行中に再トリガーされた場合はキューイングせず何もしない
    /// （戻り値false）。サイクル自体の失敗は前回スナップショットを
    /// 保持したままログに残す。
    pub async fn run_cycle(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Model discovery already in progress, skipping");
            return false;
        }
        let _guard = CycleGuard(&self.in_flight);

        info!("Starting model discovery");

        match self.collect_models().await {
            Ok(models) => {
                let resolved = resolve_alias_collisions(models);
                info!(models = resolved.len(), "Model discovery complete");
                self.registry.publish(resolved).await;
            }
            Err(e) => {
                // 個別プローブの失敗ではなくオーケストレーション自体の失敗。
                // 前回スナップショットはそのまま残す。
                error!(error = %e, "Model discovery cycle failed, keeping previous registry");
            }
        }

        true
    }

    /// 有効な全エンドポイントを並行プローブし、候補一覧を平坦化する
    async fn collect_models(&self) -> ProxyResult<Vec<DiscoveredModel>> {
        let mut handles = Vec::new();

        for spec in self.endpoints.iter().filter(|spec| spec.enable) {
            let client = self.client.clone();
            let spec = spec.clone();
            handles.push(tokio::spawn(async move {
                probe_endpoint(client, spec).await
            }));
        }

        // エンドポイント宣言順にjoinするため、衝突解決の入力順は決定的
        let mut candidates = Vec::new();
        for handle in handles {
            let models = handle
                .await
                .map_err(|e| ProxyError::Internal(format!("discovery task failed: {}", e)))?;
            candidates.extend(models);
        }

        Ok(candidates)
    }
}

/// 1エンドポイント定義ぶんのプローブを実行する
///
/// モードで分岐: URL直接 / ポート範囲（ポートごとに並行プローブ）/
/// SSHスキャン。不正な定義は警告ログと空集合で済ませる。
async fn probe_endpoint(client: Client, spec: EndpointSpec) -> Vec<DiscoveredModel> {
    let mode = match spec.mode() {
        Ok(mode) => mode,
        Err(e) => {
            warn!(error = %e, "Skipping invalid endpoint spec");
            return Vec::new();
        }
    };

    match mode {
        DiscoveryMode::Url(url) => {
            let base_url = probe::normalize_base_url(&url);
            probe::probe_backend(&client, &base_url, &spec).await
        }
        DiscoveryMode::PortRange {
            hostname,
            start,
            end,
        } => {
            let client = &client;
            let spec = &spec;
            let probes = (start..=end).map(|port| {
                let base_url =
                    probe::normalize_base_url(&format!("http://{}:{}", hostname, port));
                async move { probe::probe_backend(client, &base_url, spec).await }
            });

            join_all(probes).await.into_iter().flatten().collect()
        }
        DiscoveryMode::SshScan {
            hostname,
            username,
            env_var,
        } => ssh::scan_and_probe(&client, &hostname, &username, &env_var, &spec).await,
    }
}

/// エイリアス衝突を解決する
///
/// 発見順を保ったまま走査し、複数回現れるエイリアスを出現順の0始まり
/// 連番で `alias:<n>` にリネームする（最初の1件も含む）。1回しか
/// 現れないエイリアスはそのまま。生成名が候補一覧の既存エイリアス
/// （例: タグ"0"由来の`m:0`）と重なる場合は、その連番を飛ばして
/// 次の空き番号を使う。結果のエイリアスは互いに異なる。
pub fn resolve_alias_collisions(models: Vec<DiscoveredModel>) -> Vec<DiscoveredModel> {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for model in &models {
        *totals.entry(model.alias.clone()).or_insert(0) += 1;
    }

    // 候補の元エイリアスと割り当て済みの生成名をまとめて使用中として扱う
    let mut taken: HashSet<String> = models.iter().map(|m| m.alias.clone()).collect();

    let mut next_index: HashMap<String, usize> = HashMap::new();
    models
        .into_iter()
        .map(|mut model| {
            if totals[&model.alias] > 1 {
                let index = next_index.entry(model.alias.clone()).or_insert(0);
                let mut renamed = format!("{}:{}", model.alias, index);
                while taken.contains(&renamed) {
                    *index += 1;
                    renamed = format!("{}:{}", model.alias, index);
                }
                *index += 1;
                taken.insert(renamed.clone());
                model.alias = renamed;
            }
            model
        })
        .collect()
}
