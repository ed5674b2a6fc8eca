//! Process configuration resolved from environment variables.

use alloy::primitives::Address;
use moola_liquidator_api::DEFAULT_SUBGRAPH_ENDPOINT;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use super::bot::parse_var;
use super::{BotConfig, Network};
use crate::error::ConfigError;

/// Default location of the contract deployment artifacts.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "packages/contracts/deployments";

/// Default log file sink.
pub const DEFAULT_LOG_FILE: &str = "logs.log";

/// Environment variable names.
mod var {
    pub const PRIVATE_KEY: &str = "CELO_PRIVATE_KEY";
    pub const RPC: &str = "CELO_RPC";
    pub const CHAIN_ID: &str = "CELO_CHAIN_ID";
    pub const SUBGRAPH: &str = "MOOLA_SUBGRAPH";
    pub const LOG_FILE: &str = "LOG_FILE";
    pub const LIQUIDATION_CONTRACT: &str = "LIQUIDATION_CONTRACT";
    pub const DEPLOYMENTS_DIR: &str = "DEPLOYMENTS_DIR";
    pub const BRIDGE_TOKEN: &str = "BRIDGE_TOKEN";
    pub const BOT_CONFIG: &str = "BOT_CONFIG";
}

/// Everything the binary needs to wire the bot together.
#[derive(Clone)]
pub struct AppConfig {
    pub private_key: String,
    pub network: Network,
    pub rpc_url: String,
    pub subgraph_url: String,
    /// `LiquidateLoan` contract address
    pub liquidation_contract: Address,
    /// Overrides the network's bridge token
    pub bridge_token: Option<Address>,
    /// File sink for logs; `None` disables it
    pub log_file: Option<String>,
    pub bot: BotConfig,
}

/// Hardhat-deploy artifact; only the address is needed.
#[derive(Deserialize)]
struct DeploymentArtifact {
    address: Address,
}

impl AppConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset, except `LOG_FILE` where an empty
    /// value disables the file sink.
    pub fn from_lookup<F>(get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| get_env(name).filter(|v| !v.trim().is_empty());

        let private_key = get(var::PRIVATE_KEY).ok_or(ConfigError::MissingCredential(var::PRIVATE_KEY))?;

        let network = match get(var::CHAIN_ID) {
            Some(v) => Network::from_chain_id(parse_var(var::CHAIN_ID, &v)?)?,
            None => Network::default(),
        };

        let rpc_url = get(var::RPC).unwrap_or_else(|| network.default_rpc_url().to_string());
        let subgraph_url = get(var::SUBGRAPH).unwrap_or_else(|| DEFAULT_SUBGRAPH_ENDPOINT.to_string());

        let log_file = Self::log_file_from(&get_env);

        let liquidation_contract = match get(var::LIQUIDATION_CONTRACT) {
            Some(v) => parse_var(var::LIQUIDATION_CONTRACT, &v)?,
            None => {
                let dir = get(var::DEPLOYMENTS_DIR).unwrap_or_else(|| DEFAULT_DEPLOYMENTS_DIR.to_string());
                load_deployment(Path::new(&dir), network)?
            }
        };

        let bridge_token = get(var::BRIDGE_TOKEN)
            .map(|v| parse_var(var::BRIDGE_TOKEN, &v))
            .transpose()?;

        let mut bot = match get(var::BOT_CONFIG) {
            Some(path) => BotConfig::from_file(&path)?,
            None => BotConfig::default(),
        };
        bot.apply_env(&get)?;

        Ok(Self {
            private_key,
            network,
            rpc_url,
            subgraph_url,
            liquidation_contract,
            bridge_token,
            log_file,
            bot,
        })
    }

    /// Log file sink: `LOG_FILE`, default `logs.log`, empty disables.
    ///
    /// Separate from `from_lookup` so logging can be set up before the rest
    /// of the configuration is validated.
    pub fn log_file_from<F>(get_env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        match get_env(var::LOG_FILE) {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => Some(DEFAULT_LOG_FILE.to_string()),
        }
    }

    /// Log the resolved configuration (without the key).
    pub fn log_config(&self) {
        info!(
            network = %self.network,
            rpc = %self.rpc_url,
            subgraph = %self.subgraph_url,
            contract = %self.liquidation_contract,
            bridge = ?self.bridge_token,
            log_file = ?self.log_file,
            "Process configuration loaded"
        );
        self.bot.log_config();
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("private_key", &"<redacted>")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url)
            .field("subgraph_url", &self.subgraph_url)
            .field("liquidation_contract", &self.liquidation_contract)
            .field("bridge_token", &self.bridge_token)
            .field("log_file", &self.log_file)
            .field("bot", &self.bot)
            .finish()
    }
}

/// Read the `LiquidateLoan` address from `<dir>/<network>/LiquidateLoan.json`.
fn load_deployment(dir: &Path, network: Network) -> Result<Address, ConfigError> {
    let path: PathBuf = dir.join(network.deployment_name()).join("LiquidateLoan.json");
    let missing = |reason: String| ConfigError::MissingDeployment {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(&path).map_err(|e| missing(e.to_string()))?;
    let artifact: DeploymentArtifact =
        serde_json::from_str(&content).map_err(|e| missing(e.to_string()))?;
    Ok(artifact.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CONTRACT: &str = "0x1111111111111111111111111111111111111111";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_missing_private_key() {
        let err = AppConfig::from_lookup(lookup(&[(var::LIQUIDATION_CONTRACT, CONTRACT)])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("CELO_PRIVATE_KEY")));
        assert_eq!(err.to_string(), "Please provide CELO_PRIVATE_KEY env variable");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::LIQUIDATION_CONTRACT, CONTRACT),
        ]))
        .unwrap();

        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.rpc_url, "https://forno.celo.org");
        assert_eq!(config.subgraph_url, DEFAULT_SUBGRAPH_ENDPOINT);
        assert_eq!(config.log_file.as_deref(), Some(DEFAULT_LOG_FILE));
        assert_eq!(config.liquidation_contract, CONTRACT.parse::<Address>().unwrap());
        assert!(config.bridge_token.is_none());
        assert_eq!(config.bot, BotConfig::default());
    }

    #[test]
    fn test_alfajores_preset_and_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::CHAIN_ID, "44787"),
            (var::LIQUIDATION_CONTRACT, CONTRACT),
            (var::LOG_FILE, ""),
            (var::BRIDGE_TOKEN, "0x2222222222222222222222222222222222222222"),
            ("BOT_POLLING_MS", "1000"),
        ]))
        .unwrap();

        assert_eq!(config.network, Network::Alfajores);
        assert_eq!(config.rpc_url, "https://alfajores-forno.celo-testnet.org");
        assert!(config.log_file.is_none());
        assert_eq!(config.bridge_token, Some(Address::repeat_byte(0x22)));
        assert_eq!(config.bot.polling.bot_ms, 1000);
    }

    #[test]
    fn test_unsupported_chain() {
        let err = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::CHAIN_ID, "1"),
            (var::LIQUIDATION_CONTRACT, CONTRACT),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedNetwork(1)));
    }

    #[test]
    fn test_contract_from_deployment_artifact() {
        let dir = std::env::temp_dir().join(format!("moola-deployments-{}", std::process::id()));
        let celo = dir.join("celo");
        std::fs::create_dir_all(&celo).unwrap();
        std::fs::write(
            celo.join("LiquidateLoan.json"),
            r#"{"address":"0x3333333333333333333333333333333333333333","abi":[]}"#,
        )
        .unwrap();

        let dir_str = dir.display().to_string();
        let config = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::DEPLOYMENTS_DIR, dir_str.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.liquidation_contract, Address::repeat_byte(0x33));

        // No artifact for alfajores
        let err = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::CHAIN_ID, "44787"),
            (var::DEPLOYMENTS_DIR, dir_str.as_str()),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDeployment { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AppConfig::from_lookup(lookup(&[
            (var::PRIVATE_KEY, KEY),
            (var::LIQUIDATION_CONTRACT, CONTRACT),
        ]))
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(&KEY[2..]));
        assert!(debug.contains("<redacted>"));
    }
}
