use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// A validator's signed attestation that a local block is a valid anchor candidate.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Auth {
    /// Local height being anchored.
    pub block_height: u64,
    /// Hash of the local block being anchored.
    pub block_hash: Hash,
    /// Local tip height at which the auth was created.
    pub creation_height: u64,
    /// The signing validator.
    pub signer: PublicKey,
    /// Signature over (block_height, block_hash, creation_height).
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

/// Auths sharing (block_height, block_hash, creation_height), with a signer count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGroup {
    pub block_height: u64,
    pub block_hash: Hash,
    pub creation_height: u64,
    pub signers: usize,
}

/// The validators allowed to sign auths and to vote reward confirmations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTeam {
    /// Auth team, sorted by public key.
    pub auth: Vec<PublicKey>,
    /// Confirm team, sorted by public key.
    pub confirm: Vec<PublicKey>,
}

impl AnchorTeam {
    /// Whether `pubkey` may sign auths.
    pub fn is_auth_member(&self, pubkey: &PublicKey) -> bool {
        self.auth.binary_search(pubkey).is_ok()
    }

    /// Whether `pubkey` may vote reward confirmations.
    pub fn is_confirm_member(&self, pubkey: &PublicKey) -> bool {
        self.confirm.binary_search(pubkey).is_ok()
    }
}

/// A signer and its signature, as carried inside transactions.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignerSignature {
    pub signer: PublicKey,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

/// The checkpoint committed into the external chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AnchorPayload {
    pub local_block_height: u64,
    pub local_block_hash: Hash,
    pub creation_height: u64,
    /// External tx hash of the previous rewarded anchor (zero-hash if none).
    pub previous_anchor: Hash,
    /// Where the community reward is paid.
    pub reward_address: Address,
    /// Auth signatures over (local_block_height, local_block_hash, creation_height).
    pub auths: Vec<SignerSignature>,
}

/// An external-chain output funding an anchor transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ExternalInput {
    pub txid: Hash,
    pub vout: u32,
    pub amount: u64,
}

/// An external-chain transaction carrying an anchor payload.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AnchorTransaction {
    pub inputs: Vec<ExternalInput>,
    /// Fee paid on the external chain.
    pub fee: u64,
    pub payload: AnchorPayload,
    /// One signature per input, by the key that owns it.
    pub input_signatures: Vec<SignerSignature>,
}

/// An anchor transaction seen on the external chain but not yet promoted.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PendingAnchor {
    pub external_tx_hash: Hash,
    pub external_block_height: u64,
    pub local_block_height: u64,
    pub local_block_hash: Hash,
    pub reward_address: Address,
    pub signature_count: u32,
    pub creation_height: u64,
    pub confirmations: u64,
}

/// A promoted anchor tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Anchor {
    pub external_block_height: u64,
    pub external_tx_hash: Hash,
    /// External tx hash of the most recently rewarded lower anchor (zero-hash if none).
    pub previous_anchor_tx_hash: Hash,
    pub local_block_height: u64,
    pub local_block_hash: Hash,
    pub reward_address: Address,
    pub confirmations: u64,
    pub signature_count: u32,
    pub creation_height: u64,
    pub active: bool,
}

impl Anchor {
    /// Build an inactive anchor from a pending entry.
    pub fn from_pending(pending: PendingAnchor) -> Self {
        Self {
            external_block_height: pending.external_block_height,
            external_tx_hash: pending.external_tx_hash,
            previous_anchor_tx_hash: ZERO_HASH,
            local_block_height: pending.local_block_height,
            local_block_hash: pending.local_block_hash,
            reward_address: pending.reward_address,
            confirmations: pending.confirmations,
            signature_count: pending.signature_count,
            creation_height: pending.creation_height,
            active: false,
        }
    }

    /// Turn the anchor back into a pending entry (external reorg).
    pub fn into_pending(self) -> PendingAnchor {
        PendingAnchor {
            external_tx_hash: self.external_tx_hash,
            external_block_height: self.external_block_height,
            local_block_height: self.local_block_height,
            local_block_hash: self.local_block_hash,
            reward_address: self.reward_address,
            signature_count: self.signature_count,
            creation_height: self.creation_height,
            confirmations: 0,
        }
    }
}

/// An entry of the unrewarded list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrewardedAnchor {
    pub local_height: u64,
    pub local_hash: Hash,
    pub external_height: u64,
    pub external_hash: Hash,
}

/// A confirm-team member's signed vote to pay the reward of an anchor.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RewardVote {
    pub anchor_tx_hash: Hash,
    pub local_anchor_height: u64,
    pub previous_anchor_height: u64,
    pub reward_address: Address,
    pub signer: PublicKey,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

/// An in-flight quorum vote for the head of the unrewarded list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardConfirm {
    pub local_anchor_height: u64,
    pub previous_anchor_height: u64,
    pub reward_address: Address,
    pub signer_count: usize,
    pub external_tx_hash: Hash,
}

/// The payout carried by the local block that pays an anchor reward.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RewardTransaction {
    pub anchor_tx_hash: Hash,
    pub reward_address: Address,
    pub amount: Amount,
    /// Confirm-team signatures over the reward vote data.
    pub confirm_signatures: Vec<SignerSignature>,
}

/// Permanent mapping from a rewarded anchor to the transaction that paid it.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RewardRecord {
    pub anchor_tx_hash: Hash,
    pub reward_tx_hash: Hash,
    /// Local block that carried the reward transaction.
    pub local_height: u64,
    pub local_hash: Hash,
}

/// Community balances tracked by the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityBalances {
    pub anchor_reward: Amount,
}
