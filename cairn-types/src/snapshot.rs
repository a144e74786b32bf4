use borsh::{BorshDeserialize, BorshSerialize};

use crate::anchor::{Anchor, Auth, PendingAnchor, RewardRecord, RewardVote};
use crate::chain::{BlockRecord, Validator};
use crate::primitives::Amount;

/// Everything the anchor engine needs to resume after a restart.
///
/// Team assignments and derived views (unrewarded list, reward confirms) are
/// not stored; they are recomputed from these fields on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AnchorSnapshot {
    /// Canonical local chain, genesis first.
    pub blocks: Vec<BlockRecord>,
    pub validators: Vec<Validator>,
    pub auths: Vec<Auth>,
    pub pending: Vec<PendingAnchor>,
    pub anchors: Vec<Anchor>,
    pub votes: Vec<RewardVote>,
    pub rewards: Vec<RewardRecord>,
    /// Current community anchor reward pool.
    pub pool: Amount,
    /// Latest known external chain height.
    pub external_height: u64,
}
