//! CLI module for llproxy
//!
//! Provides the command-line interface for the proxy server.

use clap::Parser;
use std::path::PathBuf;

/// LLProxy - Unified virtual catalog and streaming proxy for LLM inference backends
#[derive(Parser, Debug)]
#[command(name = "llproxy")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    LLPROXY_HOST         Bind address (overrides config file)
    LLPROXY_PORT         Listen port (overrides config file)
    LLPROXY_LOG_LEVEL    Log level (default: info)
    LLPROXY_SSH_KEY      SSH private key for remote port scans (default: ~/.ssh/id_rsa)
"#)]
pub struct Cli {
    /// 設定ファイルのパス
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,
}
