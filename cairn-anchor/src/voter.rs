use std::collections::BTreeMap;

use cairn_crypto::keys::{verify, Keypair};
use cairn_types::anchor::{Anchor, AnchorTeam, RewardConfirm, RewardVote, SignerSignature};
use cairn_types::primitives::*;

use crate::error::AnchorError;
use crate::registry::AnchorRegistry;

const VOTE_TAG: &[u8] = b"cairn:reward-vote:";

/// Bytes signed by a reward vote.
pub fn vote_signing_data(
    anchor_tx_hash: &Hash,
    local_anchor_height: u64,
    previous_anchor_height: u64,
    reward_address: &Address,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(VOTE_TAG.len() + 32 + 8 + 8 + 20);
    data.extend_from_slice(VOTE_TAG);
    data.extend_from_slice(anchor_tx_hash);
    data.extend_from_slice(&local_anchor_height.to_le_bytes());
    data.extend_from_slice(&previous_anchor_height.to_le_bytes());
    data.extend_from_slice(reward_address);
    data
}

/// Local height of the anchor `anchor` links to, 0 if none.
pub fn previous_anchor_height(anchor: &Anchor, registry: &AnchorRegistry) -> u64 {
    registry
        .get(&anchor.previous_anchor_tx_hash)
        .map(|p| p.local_block_height)
        .unwrap_or(0)
}

/// Sign a reward vote for `anchor`.
pub fn sign_vote(keypair: &Keypair, anchor: &Anchor, previous_height: u64) -> RewardVote {
    let data = vote_signing_data(
        &anchor.external_tx_hash,
        anchor.local_block_height,
        previous_height,
        &anchor.reward_address,
    );
    RewardVote {
        anchor_tx_hash: anchor.external_tx_hash,
        local_anchor_height: anchor.local_block_height,
        previous_anchor_height: previous_height,
        reward_address: anchor.reward_address,
        signer: keypair.public_key(),
        signature: keypair.sign(&data),
    }
}

/// Confirm-team votes authorizing reward payouts.
///
/// Votes are kept after the payout lands so that a rollback of the reward
/// block brings the confirm back without a re-vote. Votes from signers that
/// leave the confirm team are discarded.
#[derive(Debug, Clone, Default)]
pub struct RewardConfirmVoter {
    votes: BTreeMap<(Hash, PublicKey), RewardVote>,
}

impl RewardConfirmVoter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_votes(votes: Vec<RewardVote>) -> Self {
        Self {
            votes: votes
                .into_iter()
                .map(|v| ((v.anchor_tx_hash, v.signer), v))
                .collect(),
        }
    }

    pub fn votes(&self) -> Vec<RewardVote> {
        self.votes.values().cloned().collect()
    }

    pub fn has_voted(&self, anchor_tx_hash: &Hash, signer: &PublicKey) -> bool {
        self.votes.contains_key(&(*anchor_tx_hash, *signer))
    }

    /// Validate and store a vote. Returns false for an already recorded vote.
    pub fn record(
        &mut self,
        vote: RewardVote,
        registry: &AnchorRegistry,
        confirm_team: &AnchorTeam,
    ) -> Result<bool, AnchorError> {
        let data = vote_signing_data(
            &vote.anchor_tx_hash,
            vote.local_anchor_height,
            vote.previous_anchor_height,
            &vote.reward_address,
        );
        verify(&data, &vote.signature, &vote.signer).map_err(|e| AnchorError::InvalidSignature {
            reason: e.to_string(),
        })?;

        if !confirm_team.is_confirm_member(&vote.signer) {
            return Err(AnchorError::UnauthorizedSigner {
                signer: vote.signer,
            });
        }

        let anchor = registry
            .get(&vote.anchor_tx_hash)
            .ok_or_else(|| AnchorError::InvalidReward {
                reason: format!("vote for unknown anchor {}", hex::encode(vote.anchor_tx_hash)),
            })?;
        if anchor.local_block_height != vote.local_anchor_height
            || anchor.reward_address != vote.reward_address
            || previous_anchor_height(anchor, registry) != vote.previous_anchor_height
        {
            return Err(AnchorError::InvalidReward {
                reason: "vote disagrees with local anchor view".to_string(),
            });
        }

        if self.has_voted(&vote.anchor_tx_hash, &vote.signer) {
            return Ok(false);
        }
        self.votes.insert((vote.anchor_tx_hash, vote.signer), vote);
        Ok(true)
    }

    /// Votes for `anchor_tx_hash` from current confirm-team members, sorted by signer.
    pub fn signatures_for(&self, anchor_tx_hash: &Hash, confirm_team: &AnchorTeam) -> Vec<SignerSignature> {
        self.votes
            .range((*anchor_tx_hash, [0u8; 32])..=(*anchor_tx_hash, [0xFF; 32]))
            .map(|(_, v)| v)
            .filter(|v| confirm_team.is_confirm_member(&v.signer))
            .map(|v| SignerSignature {
                signer: v.signer,
                signature: v.signature,
            })
            .collect()
    }

    /// The in-flight confirm for the head of the unrewarded list, if anyone voted.
    pub fn tally(&self, registry: &AnchorRegistry, confirm_team: &AnchorTeam) -> Option<RewardConfirm> {
        let head = registry.unrewarded_head()?;
        let signer_count = self.signatures_for(&head.external_tx_hash, confirm_team).len();
        if signer_count == 0 {
            return None;
        }
        Some(RewardConfirm {
            local_anchor_height: head.local_block_height,
            previous_anchor_height: previous_anchor_height(head, registry),
            reward_address: head.reward_address,
            signer_count,
            external_tx_hash: head.external_tx_hash,
        })
    }

    /// Drop votes from non-members, for unknown anchors, and votes that no
    /// longer match the anchor's current lineage.
    pub fn revalidate(&mut self, registry: &AnchorRegistry, confirm_team: &AnchorTeam) -> usize {
        let before = self.votes.len();
        self.votes.retain(|(hash, signer), vote| {
            confirm_team.is_confirm_member(signer)
                && registry.get(hash).is_some_and(|anchor| {
                    previous_anchor_height(anchor, registry) == vote.previous_anchor_height
                })
        });
        before - self.votes.len()
    }
}
