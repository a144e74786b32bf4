use serde::{Deserialize, Serialize};
use std::path::Path;

use cairn_anchor::params::AnchorParams;

use crate::error::NodeError;
use crate::genesis::GenesisConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub validator: ValidatorConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
    /// Anchor consensus policy; omitted fields take protocol defaults.
    #[serde(default)]
    pub anchor: AnchorParams,
    #[serde(default)]
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory" or "sqlite"
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Hex-encoded 32-byte seeds of the validator keys this node holds.
    #[serde(default)]
    pub keypair_seeds: Vec<String>,
    /// Produce blocks on a local timer (solo/dev mode).
    #[serde(default)]
    pub dev_mode: bool,
    /// Wall-clock interval between dev blocks.
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    /// Block timestamp increment of dev blocks.
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,
}

fn default_block_interval_ms() -> u64 {
    1_000
}

fn default_block_time_secs() -> u64 {
    480
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: dirs::home_dir()
                    .map(|h| h.join(".cairn").join("data").to_string_lossy().into_owned())
                    .unwrap_or_else(|| "./cairn-data".to_string()),
                db_type: "memory".to_string(),
            },
            validator: ValidatorConfig {
                enabled: false,
                keypair_seeds: Vec::new(),
                dev_mode: false,
                block_interval_ms: default_block_interval_ms(),
                block_time_secs: default_block_time_secs(),
            },
            rpc: RpcConfig {
                enabled: true,
                listen_addr: "127.0.0.1:9841".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            anchor: AnchorParams::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.anchor.validate().map_err(|e| NodeError::ConfigError {
            reason: format!("invalid anchor parameters in '{}': {}", path, e),
        })?;
        Ok(config)
    }

    /// A solo devnet node holding every devnet validator key.
    pub fn dev() -> Self {
        let mut config = Self::default();
        config.validator.enabled = true;
        config.validator.dev_mode = true;
        config.validator.keypair_seeds = crate::genesis::devnet_seeds();
        config.storage.db_type = "sqlite".to_string();
        config.genesis = crate::genesis::devnet_genesis();
        config
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let mut config = NodeConfig::default();
        config.genesis = crate::genesis::devnet_genesis();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join("cairn.toml");
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_anchor::params::TieBreak;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.storage.db_type, "memory");
        assert!(!config.validator.enabled);
        assert!(config.rpc.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.anchor, AnchorParams::default());
    }

    #[test]
    fn test_dev_config_holds_devnet_keys() {
        let config = NodeConfig::dev();
        assert!(config.validator.dev_mode);
        assert_eq!(config.validator.keypair_seeds.len(), 8);
        assert_eq!(config.genesis.validators.len(), 8);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = NodeConfig::dev();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.rpc.listen_addr, config.rpc.listen_addr);
        assert_eq!(deserialized.genesis, config.genesis);
        assert_eq!(deserialized.anchor, config.anchor);
    }

    #[test]
    fn test_partial_anchor_section() {
        let toml_str = r#"
            [storage]
            data_dir = "/tmp/cairn"
            db_type = "memory"

            [validator]
            enabled = false

            [rpc]
            enabled = false
            listen_addr = "127.0.0.1:0"

            [logging]
            level = "debug"

            [anchor]
            activate_depth = 10
            tie_break = "latest_external_height"
        "#;
        let config: NodeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.anchor.activate_depth, 10);
        assert_eq!(config.anchor.tie_break, TieBreak::LatestExternalHeight);
        assert_eq!(config.anchor.quorum, 2);
        assert_eq!(config.validator.block_time_secs, 480);
    }

    #[test]
    fn test_load_rejects_invalid_anchor_params() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.anchor.quorum = 5;
        let path = tmp.path().join("cairn.toml");
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert!(matches!(
            NodeConfig::load(path.to_str().unwrap()),
            Err(NodeError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_init_creates_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        NodeConfig::init(dir).unwrap();

        let config_path = tmp.path().join("cairn.toml");
        let config = NodeConfig::load(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.genesis.validators.len(), 8);
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(NodeConfig::load("/nonexistent/path/cairn.toml").is_err());
    }
}
