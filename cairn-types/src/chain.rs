use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::anchor::RewardTransaction;
use crate::primitives::*;

/// A change to the validator registry carried by a local block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ValidatorUpdate {
    /// A validator becomes active from the block's height onward.
    Register { pubkey: PublicKey },
    /// A validator stops being active from the block's height onward.
    Resign { pubkey: PublicKey },
}

/// A validator registry entry.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Validator {
    pub pubkey: PublicKey,
    pub address: Address,
    pub registered_at: u64,
    pub resigned_at: Option<u64>,
}

impl Validator {
    /// Whether the validator is active as of `height`.
    pub fn is_active_at(&self, height: u64) -> bool {
        self.registered_at <= height && self.resigned_at.map_or(true, |r| r > height)
    }
}

/// The parts of a local block this subsystem consumes.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LocalBlock {
    pub height: u64,
    /// Hash of this block, computed over every other field.
    pub hash: Hash,
    pub prev_hash: Hash,
    pub timestamp: Timestamp,
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Anchor reward paid by this block, if any.
    pub anchor_reward: Option<RewardTransaction>,
}

/// A connected block together with the data needed to disconnect it.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block: LocalBlock,
    /// Community pool balance after this block was connected.
    pub pool_after: Amount,
}

impl BlockRecord {
    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn hash(&self) -> Hash {
        self.block.hash
    }

    pub fn timestamp(&self) -> Timestamp {
        self.block.timestamp
    }
}
