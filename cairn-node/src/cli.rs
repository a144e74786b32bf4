use clap::{Parser, Subcommand};

use cairn_crypto::keys::Keypair;

use crate::config::NodeConfig;
use crate::error::NodeError;

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn node: anchors local checkpoints into an external chain and pays anchor rewards",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "cairn.toml")]
        config: String,
        /// Start a solo devnet producer holding all devnet validator keys
        #[arg(long)]
        dev: bool,
        /// Override RPC listen address (e.g., "0.0.0.0:9841" for LAN access)
        #[arg(long)]
        rpc_addr: Option<String>,
        /// Storage backend: "sqlite" (default for --dev) or "memory"
        #[arg(long)]
        storage: Option<String>,
        /// Override data directory path
        #[arg(long)]
        data_dir: Option<String>,
        /// Wipe the data directory before starting
        #[arg(long)]
        reset_state: bool,
        /// Hex-encoded 32-byte validator seed (can be specified multiple times)
        #[arg(long = "keypair-seed")]
        keypair_seeds: Vec<String>,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Write the genesis block of a config file as JSON
    Genesis {
        /// Path to config file
        #[arg(short, long, default_value = "cairn.toml")]
        config: String,
        /// Output path for genesis block
        #[arg(short, long, default_value = "genesis.json")]
        output: String,
    },
    /// Generate a new validator keypair
    Keygen,
}

impl Cli {
    /// Log level from the config file named on the command line, if any.
    pub fn log_level(&self) -> String {
        match &self.command {
            Command::Run { config, dev, .. } if !dev => NodeConfig::load(config)
                .map(|c| c.logging.level)
                .unwrap_or_else(|_| "info".to_string()),
            _ => "info".to_string(),
        }
    }
}

/// Resolve the effective configuration of `cairn run`.
pub fn resolve_config(
    config: &str,
    dev: bool,
    rpc_addr: Option<String>,
    storage: Option<String>,
    data_dir: Option<String>,
    keypair_seeds: Vec<String>,
) -> Result<NodeConfig, NodeError> {
    let mut config = if dev {
        NodeConfig::dev()
    } else {
        NodeConfig::load(config)?
    };
    if let Some(addr) = rpc_addr {
        config.rpc.listen_addr = addr;
    }
    if let Some(db) = storage {
        config.storage.db_type = db;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    if !keypair_seeds.is_empty() {
        config.validator.enabled = true;
        config.validator.keypair_seeds = keypair_seeds;
    }
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            dev,
            rpc_addr,
            storage,
            data_dir,
            reset_state,
            keypair_seeds,
        } => {
            let config = resolve_config(&config, dev, rpc_addr, storage, data_dir, keypair_seeds)?;

            if reset_state {
                let path = std::path::Path::new(&config.storage.data_dir);
                if path.exists() {
                    tracing::warn!(data_dir = %config.storage.data_dir, "wiping data directory (--reset-state)");
                    std::fs::remove_dir_all(path)?;
                } else {
                    tracing::info!(data_dir = %config.storage.data_dir, "data directory does not exist, nothing to reset");
                }
            }

            let mut node = crate::node::Node::new(config).await?;
            node.run().await
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("node configuration initialized in {}", dir);
            Ok(())
        }
        Command::Genesis { config, output } => crate::genesis::generate_genesis(&config, &output),
        Command::Keygen => {
            let keypair = Keypair::generate();
            println!("Seed: {}", hex::encode(keypair.seed()));
            println!("Public key: {}", hex::encode(keypair.public_key()));
            println!("Address: {}", hex::encode(keypair.address()));
            Ok(())
        }
    }
}
