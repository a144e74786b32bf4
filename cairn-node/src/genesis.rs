use serde::{Deserialize, Serialize};

use cairn_anchor::chain::genesis_block;
use cairn_crypto::keys::Keypair;
use cairn_types::chain::LocalBlock;
use cairn_types::primitives::*;

use crate::error::NodeError;

/// Genesis timestamp of the devnet.
pub const DEVNET_GENESIS_TIMESTAMP: Timestamp = 1_700_000_000;

/// Number of validators in the devnet.
pub const DEVNET_VALIDATORS: usize = 8;

/// Genesis section of the node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Genesis block timestamp (seconds).
    pub timestamp: Timestamp,
    /// Hex-encoded Ed25519 public keys registered at height 0.
    pub validators: Vec<String>,
}

/// Deterministic seed of devnet validator `index`.
pub fn devnet_seed(index: usize) -> [u8; 32] {
    cairn_crypto::hash::blake3_kdf("cairn devnet validator seed v1", &(index as u64).to_le_bytes())
}

/// Hex seeds of all devnet validators.
pub fn devnet_seeds() -> Vec<String> {
    (0..DEVNET_VALIDATORS)
        .map(|i| hex::encode(devnet_seed(i)))
        .collect()
}

/// The devnet genesis: every devnet validator registered at height 0.
pub fn devnet_genesis() -> GenesisConfig {
    GenesisConfig {
        timestamp: DEVNET_GENESIS_TIMESTAMP,
        validators: (0..DEVNET_VALIDATORS)
            .map(|i| hex::encode(Keypair::from_seed(&devnet_seed(i)).public_key()))
            .collect(),
    }
}

/// Parse a hex-encoded 32-byte value.
pub fn parse_hex32(s: &str, what: &str) -> Result<[u8; 32], NodeError> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| NodeError::ConfigError {
        reason: format!("invalid {} hex: {}", what, e),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| NodeError::ConfigError {
        reason: format!("{} must be 32 bytes, got {}", what, b.len()),
    })
}

/// Build the genesis block described by `config`.
pub fn build_genesis(config: &GenesisConfig) -> Result<LocalBlock, NodeError> {
    if config.validators.is_empty() {
        return Err(NodeError::GenesisError {
            reason: "genesis must register at least one validator".to_string(),
        });
    }
    let validators = config
        .validators
        .iter()
        .map(|v| parse_hex32(v, "validator public key"))
        .collect::<Result<Vec<PublicKey>, NodeError>>()
        .map_err(|e| NodeError::GenesisError {
            reason: e.to_string(),
        })?;
    Ok(genesis_block(config.timestamp, &validators)?)
}

/// Write the genesis block of the config at `config_path` as JSON to `output`.
pub fn generate_genesis(config_path: &str, output: &str) -> Result<(), NodeError> {
    let config = crate::config::NodeConfig::load(config_path)?;
    let block = build_genesis(&config.genesis)?;
    let json = serde_json::to_string_pretty(&block).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to serialize genesis block: {}", e),
    })?;
    std::fs::write(output, json)?;
    tracing::info!(hash = %hex::encode(block.hash), output, "genesis block written");
    Ok(())
}
