use thiserror::Error;

/// Low-level errors shared by the types and crypto crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CairnError {
    #[error("invalid signature: signer {signer_index}")]
    InvalidSignature { signer_index: usize },

    #[error("invalid key material")]
    InvalidKeyMaterial,

    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },

    #[error("balance overflow")]
    BalanceOverflow,
}
