//! 設定管理
//!
//! ProxyConfig, EndpointSpec等の設定構造体

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// プロキシサーバー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// ホストアドレス (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// ポート番号 (デフォルト: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// モデル探索の実行間隔（秒）(デフォルト: 30)
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    /// バックエンドのエンドポイント定義
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_discovery_interval() -> u64 {
    30
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            discovery_interval_secs: default_discovery_interval(),
            endpoints: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// JSONファイルから設定を読み込み
    pub fn load(path: impl AsRef<Path>) -> CommonResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CommonError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// バックエンド探索のエンドポイント定義
///
/// 探索モードは3種類あり、いずれか1つだけを指定する:
/// - `url`: 単一バックエンドへの直接プローブ
/// - `port_start`/`port_end`: `hostname`上のポート範囲スキャン
/// - `ssh_username`/`env_var`: SSH経由のリモートプロセススキャン
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// エンドポイントの有効フラグ (デフォルト: true)
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// バックエンドのベースURL（単一バックエンドモード）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// スキャン対象ホスト名（ポート範囲/SSHモード）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// スキャン開始ポート
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_start: Option<u16>,

    /// スキャン終了ポート（両端含む）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_end: Option<u16>,

    /// SSH接続ユーザー名（SSHモード）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,

    /// ポート番号を公開する環境変数名（SSHモード）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,

    /// タグ。非空の場合、モデルごとに `<name>:<tag>` をタグ数ぶん公開する
    #[serde(default)]
    pub tags: Vec<String>,

    /// バックエンドへ転送するBearerトークン
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,

    /// エイリアスの部分一致フィルター。非空の場合、いずれかを含むエイリアスのみ公開
    #[serde(default)]
    pub filter: Vec<String>,

    /// モデル一覧の静的オーバーライド。非空の場合 `/models` プローブを行わない
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_enable() -> bool {
    true
}

impl Default for EndpointSpec {
    fn default() -> Self {
        Self {
            enable: true,
            url: None,
            hostname: None,
            port_start: None,
            port_end: None,
            ssh_username: None,
            env_var: None,
            tags: Vec::new(),
            apikey: None,
            filter: Vec::new(),
            models: Vec::new(),
        }
    }
}

/// エンドポイントの探索モード
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// 単一バックエンドへの直接プローブ
    Url(String),
    /// ホスト上の連続ポート範囲スキャン
    PortRange {
        /// スキャン対象ホスト名
        hostname: String,
        /// 開始ポート
        start: u16,
        /// 終了ポート（両端含む）
        end: u16,
    },
    /// SSH経由のリモートプロセススキャン
    SshScan {
        /// スキャン対象ホスト名
        hostname: String,
        /// SSH接続ユーザー名
        username: String,
        /// ポート番号を公開する環境変数名
        env_var: String,
    },
}

impl EndpointSpec {
    /// フィールドの組み合わせを検証し、探索モードを決定する
    ///
    /// 3モードは相互排他。複数指定・不足はValidationエラーになる。
    pub fn mode(&self) -> CommonResult<DiscoveryMode> {
        match (
            &self.url,
            self.port_start,
            self.port_end,
            &self.ssh_username,
            &self.env_var,
        ) {
            (Some(url), None, None, None, None) => Ok(DiscoveryMode::Url(url.clone())),
            (None, Some(start), Some(end), None, None) => {
                let hostname = self.hostname.clone().ok_or_else(|| {
                    CommonError::Validation("port range endpoint requires hostname".to_string())
                })?;
                if start > end {
                    return Err(CommonError::Validation(format!(
                        "port_start {} exceeds port_end {}",
                        start, end
                    )));
                }
                Ok(DiscoveryMode::PortRange {
                    hostname,
                    start,
                    end,
                })
            }
            (None, None, None, Some(username), Some(env_var)) => {
                let hostname = self.hostname.clone().ok_or_else(|| {
                    CommonError::Validation("ssh endpoint requires hostname".to_string())
                })?;
                Ok(DiscoveryMode::SshScan {
                    hostname,
                    username: username.clone(),
                    env_var: env_var.clone(),
                })
            }
            _ => Err(CommonError::Validation(
                "endpoint must specify exactly one of: url, port_start/port_end, ssh_username/env_var"
                    .to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_config_defaults() {
        let config: ProxyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.discovery_interval_secs, 30);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_endpoint_spec_defaults() {
        let spec: EndpointSpec =
            serde_json::from_str(r#"{"url": "http://localhost:1234"}"#).unwrap();
        assert!(spec.enable);
        assert!(spec.tags.is_empty());
        assert!(spec.filter.is_empty());
        assert!(spec.models.is_empty());
        assert!(spec.apikey.is_none());
    }

    #[test]
    fn test_mode_url() {
        let spec: EndpointSpec =
            serde_json::from_str(r#"{"url": "http://localhost:1234"}"#).unwrap();
        assert_eq!(
            spec.mode().unwrap(),
            DiscoveryMode::Url("http://localhost:1234".to_string())
        );
    }

    #[test]
    fn test_mode_port_range() {
        let spec: EndpointSpec = serde_json::from_str(
            r#"{"hostname": "gpu01", "port_start": 8000, "port_end": 8010}"#,
        )
        .unwrap();
        assert_eq!(
            spec.mode().unwrap(),
            DiscoveryMode::PortRange {
                hostname: "gpu01".to_string(),
                start: 8000,
                end: 8010,
            }
        );
    }

    #[test]
    fn test_mode_ssh_scan() {
        let spec: EndpointSpec = serde_json::from_str(
            r#"{"hostname": "gpu02", "ssh_username": "llm", "env_var": "LLAMA_PORT"}"#,
        )
        .unwrap();
        assert_eq!(
            spec.mode().unwrap(),
            DiscoveryMode::SshScan {
                hostname: "gpu02".to_string(),
                username: "llm".to_string(),
                env_var: "LLAMA_PORT".to_string(),
            }
        );
    }

    #[test]
    fn test_mode_rejects_mixed_modes() {
        let spec: EndpointSpec = serde_json::from_str(
            r#"{"url": "http://localhost:1234", "port_start": 8000, "port_end": 8010}"#,
        )
        .unwrap();
        assert!(spec.mode().is_err());
    }

    #[test]
    fn test_mode_rejects_missing_hostname() {
        let spec: EndpointSpec =
            serde_json::from_str(r#"{"port_start": 8000, "port_end": 8010}"#).unwrap();
        assert!(spec.mode().is_err());
    }

    #[test]
    fn test_mode_rejects_inverted_port_range() {
        let spec: EndpointSpec = serde_json::from_str(
            r#"{"hostname": "gpu01", "port_start": 8010, "port_end": 8000}"#,
        )
        .unwrap();
        assert!(spec.mode().is_err());
    }

    #[test]
    fn test_mode_rejects_empty_spec() {
        let spec: EndpointSpec = serde_json::from_str("{}").unwrap();
        assert!(spec.mode().is_err());
    }

    #[test]
    fn test_load_config_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "port": 9000,
                "endpoints": [
                    {{"hostname": "localhost", "port_start": 8000, "port_end": 8004, "tags": ["fast"]}}
                ]
            }}"#
        )
        .unwrap();

        let config = ProxyConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].tags, vec!["fast"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = ProxyConfig::load("/nonexistent/config.json");
        assert!(matches!(result, Err(CommonError::Config(_))));
    }
}
