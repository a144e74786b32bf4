use thiserror::Error;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("storage error: {0}")]
    StorageError(#[from] cairn_storage::error::StorageError),

    #[error("anchor error: {0}")]
    AnchorError(#[from] cairn_anchor::error::AnchorError),

    #[error("rpc error: {reason}")]
    RpcError { reason: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
