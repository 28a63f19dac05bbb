//! SSHポートスキャナー
//!
//! リモートホスト上のプロセス環境変数から動的割り当てポートを見つけ、
//! バックエンドプローバーへ委譲する。固定ポートなしで起動された
//! バックエンド（ジョブスケジューラ配下など）の発見に使う。

use crate::discovery::probe;
use crate::registry::DiscoveredModel;
use llproxy_common::config::EndpointSpec;
use llproxy_common::error::{ProxyError, ProxyResult};
use openssh::{KnownHosts, SessionBuilder};
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// SSH接続タイムアウト（秒）
const SSH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// リモートコマンドのタイムアウト（秒）
const SSH_COMMAND_TIMEOUT_SECS: u64 = 15;

/// SSH秘密鍵のパスを解決する
///
/// `LLPROXY_SSH_KEY`があればそれを使い、なければ`$HOME/.ssh/id_rsa`。
fn resolve_key_path() -> PathBuf {
    if let Ok(path) = std::env::var("LLPROXY_SSH_KEY") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ssh").join("id_rsa")
}

/// リモートで実行するスキャンコマンドを構築する
///
/// セッションユーザーの全プロセスについて`/proc/<pid>/environ`を読み、
/// 対象変数が設定されていれば`pid,value`を1行ずつ出力する。
fn build_scan_command(username: &str, env_var: &str) -> String {
    format!(
        "for pid in $(ps -u {username} -o pid=); do \
         tr '\\0' '\\n' < /proc/$pid/environ 2>/dev/null \
         | sed -n \"s/^{env_var}=/$pid,/p\"; \
         done"
    )
}

/// スキャン出力（`pid,port`行）を重複排除済みポート一覧へ変換する
///
/// 同一ポートを報告するプロセスが複数あってもプローブは1回で済むよう、
/// 値で重複排除する。解析できない行は無視する。
fn parse_scan_output(output: &str) -> Vec<u16> {
    let mut seen = HashSet::new();
    let mut ports = Vec::new();

    for line in output.lines() {
        let Some((_pid, value)) = line.trim().split_once(',') else {
            continue;
        };
        let Ok(port) = value.trim().parse::<u16>() else {
            continue;
        };
        if seen.insert(port) {
            ports.push(port);
        }
    }

    ports
}

/// リモートホスト上で対象環境変数を公開しているポートを列挙する
async fn scan_host(hostname: &str, username: &str, env_var: &str) -> ProxyResult<Vec<u16>> {
    let key_path = resolve_key_path();

    let mut builder = SessionBuilder::default();
    builder
        .user(username.to_string())
        .keyfile(&key_path)
        .known_hosts_check(KnownHosts::Accept)
        .connect_timeout(Duration::from_secs(SSH_CONNECT_TIMEOUT_SECS));

    let session = builder
        .connect(hostname)
        .await
        .map_err(|e| ProxyError::Ssh(format!("connect to {}: {}", hostname, e)))?;

    let script = build_scan_command(username, env_var);
    let output = {
        let mut command = session.command("sh");
        command.arg("-c").arg(&script);
        timeout(
            Duration::from_secs(SSH_COMMAND_TIMEOUT_SECS),
            command.output(),
        )
        .await
    }
    .map_err(|_| ProxyError::Timeout(format!("ssh scan of {} timed out", hostname)))?
    .map_err(|e| ProxyError::Ssh(format!("scan command on {}: {}", hostname, e)))?;

    let ports = parse_scan_output(&String::from_utf8_lossy(&output.stdout));

    // セッションはコールをまたいで保持しない
    if let Err(e) = session.close().await {
        debug!(hostname = hostname, error = %e, "Failed to close ssh session");
    }

    Ok(ports)
}

/// SSHスキャンで見つかった各ポートをプローブし、モデル集合を返す
///
/// 接続・コマンド失敗は警告ログと空集合で回復し、サイクルを中断しない。
pub async fn scan_and_probe(
    client: &Client,
    hostname: &str,
    username: &str,
    env_var: &str,
    spec: &EndpointSpec,
) -> Vec<DiscoveredModel> {
    let ports = match scan_host(hostname, username, env_var).await {
        Ok(ports) => ports,
        Err(e) => {
            warn!(hostname = hostname, error = %e, "SSH port scan failed");
            return Vec::new();
        }
    };

    debug!(
        hostname = hostname,
        env_var = env_var,
        ports = ports.len(),
        "SSH scan found candidate ports"
    );

    let probes = ports.iter().map(|port| {
        let base_url = probe::normalize_base_url(&format!("http://{}:{}", hostname, port));
        async move { probe::probe_backend(client, &base_url, spec).await }
    });

    futures::future::join_all(probes)
        .await
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_scan_command() {
        let command = build_scan_command("llm", "LLAMA_PORT");
        assert!(command.contains("ps -u llm -o pid="));
        assert!(command.contains("/proc/$pid/environ"));
        assert!(command.contains("s/^LLAMA_PORT=/$pid,/p"));
    }

    #[test]
    fn test_parse_scan_output_dedup() {
        // 同一ポートを報告する複数プロセスは1回にまとめる
        let output = "1234,8000\n1240,8001\n1251,8000\n";
        assert_eq!(parse_scan_output(output), vec![8000, 8001]);
    }

    #[test]
    fn test_parse_scan_output_ignores_garbage() {
        let output = "not-a-line\n1234,not-a-port\n,\n1240,8001\n\n";
        assert_eq!(parse_scan_output(output), vec![8001]);
    }

    #[test]
    fn test_parse_scan_output_empty() {
        assert!(parse_scan_output("").is_empty());
    }

    #[test]
    fn test_parse_scan_output_preserves_first_seen_order() {
        let output = "1,9001\n2,8000\n3,9001\n4,7000\n";
        assert_eq!(parse_scan_output(output), vec![9001, 8000, 7000]);
    }
}
