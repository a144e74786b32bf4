use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use cairn_anchor::engine::AnchorEngine;
use cairn_anchor::error::AnchorError;
use cairn_crypto::keys::Keypair;
use cairn_storage::memory::MemoryStore;
use cairn_storage::traits::KvStore;
use cairn_types::chain::LocalBlock;
use cairn_types::primitives::Timestamp;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;

/// The main node that ties together all subsystems.
pub struct Node {
    config: NodeConfig,
    engine: Arc<RwLock<AnchorEngine>>,
    keys: Vec<Keypair>,
    metrics: Arc<NodeMetrics>,
    rpc_handle: Option<jsonrpsee::server::ServerHandle>,
}

/// Create a storage backend from the node configuration.
pub fn create_store(config: &NodeConfig) -> Result<Arc<dyn KvStore>, NodeError> {
    match config.storage.db_type.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => {
            let data_dir = std::path::Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let store = cairn_storage::sqlite::SqliteStore::new(data_dir.join("cairn.db"))?;
            Ok(Arc::new(store))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory' or 'sqlite'",
                other
            ),
        }),
    }
}

/// Parse the validator keys held by this node.
pub fn load_keys(config: &NodeConfig) -> Result<Vec<Keypair>, NodeError> {
    config
        .validator
        .keypair_seeds
        .iter()
        .map(|seed| crate::genesis::parse_hex32(seed, "keypair seed").map(|s| Keypair::from_seed(&s)))
        .collect()
}

/// Produce one block on top of the tip, acting for every held key: reward
/// votes first so a settled confirm is paid in this block, then the block,
/// then auths judged from the new tip.
pub fn produce_dev_block(
    engine: &mut AnchorEngine,
    keys: &[Keypair],
    timestamp: Timestamp,
) -> Result<LocalBlock, AnchorError> {
    for key in keys {
        engine.produce_reward_vote(key)?;
    }
    let block = engine.propose_block(timestamp, vec![])?;
    engine.connect_block(block.clone())?;
    for key in keys {
        engine.produce_auth(key)?;
    }
    Ok(block)
}

impl Node {
    /// Create a new node from the given configuration.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let keys = if config.validator.enabled {
            load_keys(&config)?
        } else {
            Vec::new()
        };
        let genesis = crate::genesis::build_genesis(&config.genesis)?;
        let store = create_store(&config)?;
        let engine = AnchorEngine::open(config.anchor.clone(), genesis, store)?;

        let metrics = Arc::new(NodeMetrics::new());
        metrics.observe(&engine);
        let engine = Arc::new(RwLock::new(engine));

        let rpc_handle = if config.rpc.enabled {
            let (handle, addr) = crate::rpc::server::start_rpc_server(
                &config.rpc.listen_addr,
                engine.clone(),
                metrics.clone(),
            )
            .await?;
            tracing::info!(addr = %addr, "RPC listening");
            Some(handle)
        } else {
            None
        };

        tracing::info!(
            validator_keys = keys.len(),
            dev_mode = config.validator.dev_mode,
            rpc_enabled = config.rpc.enabled,
            storage = %config.storage.db_type,
            "node initialized"
        );

        Ok(Self {
            config,
            engine,
            keys,
            metrics,
            rpc_handle,
        })
    }

    pub fn engine(&self) -> Arc<RwLock<AnchorEngine>> {
        self.engine.clone()
    }

    /// Produce one dev block at the next simulated timestamp.
    pub async fn tick(&self) -> Result<LocalBlock, NodeError> {
        let mut engine = self.engine.write().await;
        let timestamp = engine.tip().map(|b| b.timestamp).unwrap_or(0)
            + self.config.validator.block_time_secs;
        let block = produce_dev_block(&mut engine, &self.keys, timestamp)?;
        self.metrics.blocks_produced.inc();
        if block.anchor_reward.is_some() {
            self.metrics.rewards_paid.inc();
        }
        self.metrics.observe(&engine);
        Ok(block)
    }

    /// Run the main node event loop.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        let producing = self.config.validator.enabled && self.config.validator.dev_mode;
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.validator.block_interval_ms.max(1)));

        tracing::info!(producing, "node is running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = interval.tick(), if producing => {
                    match self.tick().await {
                        Ok(block) => tracing::debug!(height = block.height, "dev block produced"),
                        Err(NodeError::AnchorError(AnchorError::Halted { reason })) => {
                            tracing::error!(%reason, "anchor engine halted, block production stopped");
                            break;
                        }
                        Err(e) => tracing::warn!("dev block production failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        if let Some(handle) = self.rpc_handle.take() {
            let _ = handle.stop();
        }
        Ok(())
    }
}
