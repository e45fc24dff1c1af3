//! Configuration management for txledger

use crate::transaction::is_account_id;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub token_contract: String,
    #[serde(default = "default_chain_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            token_contract: String::new(),
            timeout_secs: default_chain_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl ChainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_path() -> String {
    "./data/ledger.db".to_string()
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_chain_timeout() -> u64 {
    10
}

/// Reads `path` (defaults when the file is absent), applies environment
/// overrides and validates the result.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = match fs::read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(format!("Failed to read {}: {}", path.as_ref().display(), e).into()),
    };
    let mut config = parse_config(&config_str)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(toml::from_str(config_str)?)
}

/// `BLOCKCHAIN_RPC_URL`, `TOKEN_CONTRACT_ADDRESS`, `DATABASE_PATH` and `PORT`
/// take precedence over the file.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("BLOCKCHAIN_RPC_URL") {
        config.chain.rpc_url = url;
    }
    if let Some(contract) = lookup("TOKEN_CONTRACT_ADDRESS") {
        config.chain.token_contract = contract;
    }
    if let Some(path) = lookup("DATABASE_PATH") {
        config.database.path = path;
    }
    if let Some(port) = lookup("PORT") {
        let port: u16 = port
            .parse()
            .map_err(|e| format!("PORT must be a port number: {}", e))?;
        config.server.listen_addr.set_port(port);
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.database.path.is_empty() {
        return Err("database.path must be set".into());
    }

    if config.chain.rpc_url.is_empty() {
        return Err("chain.rpc_url must be set (or BLOCKCHAIN_RPC_URL)".into());
    }

    if !is_account_id(&config.chain.token_contract) {
        return Err(format!(
            "chain.token_contract must be a 0x-prefixed 20-byte address, got '{}'",
            config.chain.token_contract
        )
        .into());
    }

    if config.server.request_timeout_secs == 0 || config.chain.timeout_secs == 0 {
        return Err("timeouts must be greater than zero".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTRACT: &str = "0x4444444444444444444444444444444444444444";

    #[test]
    fn test_defaults_from_empty_file() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.database.path, "./data/ledger.db");
        assert_eq!(config.database.busy_timeout(), Duration::from_millis(5000));
        assert_eq!(config.chain.timeout(), Duration::from_secs(10));
        // no token contract configured yet
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_parse_full_file() {
        let config = parse_config(&format!(
            r#"
            [server]
            listen_addr = "127.0.0.1:9000"
            request_timeout_secs = 5

            [database]
            path = "/var/lib/txledger/ledger.db"

            [chain]
            rpc_url = "https://node.example/rpc/v1"
            token_contract = "{CONTRACT}"
            timeout_secs = 3
            "#
        ))
        .unwrap();

        assert_eq!(config.server.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.database.path, "/var/lib/txledger/ledger.db");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.chain.rpc_url, "https://node.example/rpc/v1");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = parse_config("").unwrap();
        let env: HashMap<&str, &str> = [
            ("BLOCKCHAIN_RPC_URL", "http://rpc.internal:1234"),
            ("TOKEN_CONTRACT_ADDRESS", CONTRACT),
            ("DATABASE_PATH", "/tmp/ledger.db"),
            ("PORT", "3000"),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.chain.rpc_url, "http://rpc.internal:1234");
        assert_eq!(config.chain.token_contract, CONTRACT);
        assert_eq!(config.database.path, "/tmp/ledger.db");
        assert_eq!(config.server.listen_addr.port(), 3000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let mut config = parse_config("").unwrap();
        let result = apply_env_overrides(&mut config, |k| (k == "PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(parse_config("[server]\nlisten_addr = 8080").is_err());
        assert!(parse_config("[database\npath = 1").is_err());
    }
}
