use cairn_types::primitives::PublicKey;
use thiserror::Error;

/// Errors specific to the anchor subsystem.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("stale auth: block {block_height} is below active anchor height {active_height}")]
    StaleAuth { block_height: u64, active_height: u64 },

    #[error("unauthorized signer: {}", hex::encode(.signer))]
    UnauthorizedSigner { signer: PublicKey },

    #[error("duplicate auth for block {block_height} by {}", hex::encode(.signer))]
    DuplicateAuth { block_height: u64, signer: PublicKey },

    #[error("quorum not met: have {have}, need {need}")]
    QuorumNotMet { have: usize, need: usize },

    #[error("malformed anchor payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("height {height} not eligible for anchoring: {reason}")]
    HeightNotEligible { height: u64, reason: String },

    #[error("rollback inconsistency: {reason}")]
    RollbackInconsistency { reason: String },

    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("unknown local block at height {height}")]
    UnknownBlock { height: u64 },

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("invalid reward: {reason}")]
    InvalidReward { reason: String },

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("engine halted after fatal inconsistency: {reason}")]
    Halted { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] cairn_storage::error::StorageError),
}
