use std::collections::{BTreeMap, BTreeSet};

use cairn_crypto::keys::batch_verify;
use cairn_types::anchor::{AnchorTeam, AnchorTransaction, PendingAnchor};
use cairn_types::primitives::*;

use crate::auth::{auth_signing_data, check_eligible};
use crate::chain::LocalChain;
use crate::confirmation::confirmations;
use crate::error::AnchorError;
use crate::params::AnchorParams;
use crate::payload::verify_inputs;

/// Result of inserting an observed anchor transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// First time this transaction was seen.
    Accepted,
    /// Already tracked with the same inclusion height.
    AlreadyKnown,
    /// Already tracked; its inclusion height moved.
    Updated,
}

/// Validate a decoded anchor transaction and derive its pending entry.
///
/// The payload must reference a canonical local block at an eligible height,
/// name `expected_previous` as the anchor before it, and carry distinct, valid
/// auth signatures of which at least `quorum` come from the auth team at the
/// payload's creation height.
#[allow(clippy::too_many_arguments)]
pub fn validate_transaction(
    tx: &AnchorTransaction,
    tx_hash: Hash,
    external_height: u64,
    included_at: u64,
    chain: &LocalChain,
    team_at_creation: &AnchorTeam,
    expected_previous: Hash,
    params: &AnchorParams,
) -> Result<PendingAnchor, AnchorError> {
    let payload = &tx.payload;

    let mut seen = BTreeSet::new();
    if !payload.auths.iter().all(|a| seen.insert(a.signer)) {
        return Err(AnchorError::MalformedPayload {
            reason: "duplicate auth signer".to_string(),
        });
    }

    verify_inputs(tx)?;

    let data = auth_signing_data(
        payload.local_block_height,
        &payload.local_block_hash,
        payload.creation_height,
    );
    let messages: Vec<&[u8]> = payload.auths.iter().map(|_| data.as_slice()).collect();
    let signatures: Vec<Signature> = payload.auths.iter().map(|a| a.signature).collect();
    let signers: Vec<PublicKey> = payload.auths.iter().map(|a| a.signer).collect();
    batch_verify(&messages, &signatures, &signers).map_err(|e| AnchorError::InvalidSignature {
        reason: e.to_string(),
    })?;

    let have = signers
        .iter()
        .filter(|s| team_at_creation.is_auth_member(s))
        .count();
    if have < params.quorum {
        return Err(AnchorError::QuorumNotMet {
            have,
            need: params.quorum,
        });
    }

    if !chain.is_canonical(payload.local_block_height, &payload.local_block_hash)
        || payload.creation_height > chain.tip_height()
    {
        return Err(AnchorError::UnknownBlock {
            height: payload.local_block_height,
        });
    }
    check_eligible(
        payload.local_block_height,
        payload.creation_height,
        chain,
        params,
    )?;

    if payload.previous_anchor != expected_previous {
        return Err(AnchorError::MalformedPayload {
            reason: format!(
                "previous anchor {} but last rewarded anchor below {} is {}",
                hex::encode(payload.previous_anchor),
                payload.local_block_height,
                hex::encode(expected_previous)
            ),
        });
    }

    Ok(PendingAnchor {
        external_tx_hash: tx_hash,
        external_block_height: included_at,
        local_block_height: payload.local_block_height,
        local_block_hash: payload.local_block_hash,
        reward_address: payload.reward_address,
        signature_count: have as u32,
        creation_height: payload.creation_height,
        confirmations: confirmations(external_height, included_at),
    })
}

/// Anchor transactions seen on the external chain and not yet promoted.
#[derive(Debug, Clone, Default)]
pub struct PendingAnchorTracker {
    pending: BTreeMap<Hash, PendingAnchor>,
}

impl PendingAnchorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PendingAnchor>) -> Self {
        Self {
            pending: entries
                .into_iter()
                .map(|p| (p.external_tx_hash, p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.pending.contains_key(tx_hash)
    }

    /// Insert or refresh an entry keyed by its external tx hash.
    pub fn insert(&mut self, entry: PendingAnchor) -> ObserveOutcome {
        match self.pending.get_mut(&entry.external_tx_hash) {
            Some(existing) if existing.external_block_height == entry.external_block_height => {
                ObserveOutcome::AlreadyKnown
            }
            Some(existing) => {
                *existing = entry;
                ObserveOutcome::Updated
            }
            None => {
                self.pending.insert(entry.external_tx_hash, entry);
                ObserveOutcome::Accepted
            }
        }
    }

    /// Recompute confirmations against a new external height.
    pub fn recompute(&mut self, external_height: u64) {
        for entry in self.pending.values_mut() {
            entry.confirmations = confirmations(external_height, entry.external_block_height);
        }
    }

    /// Remove and return every entry with at least `promote_depth` confirmations.
    pub fn take_promotable(&mut self, promote_depth: u64) -> Vec<PendingAnchor> {
        let ready: Vec<Hash> = self
            .pending
            .values()
            .filter(|p| p.confirmations >= promote_depth)
            .map(|p| p.external_tx_hash)
            .collect();
        ready
            .iter()
            .filter_map(|hash| self.pending.remove(hash))
            .collect()
    }

    /// Entries ordered by inclusion height, then tx hash.
    pub fn list(&self) -> Vec<PendingAnchor> {
        let mut entries: Vec<PendingAnchor> = self.pending.values().cloned().collect();
        entries.sort_by_key(|p| (p.external_block_height, p.external_tx_hash));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn make_pending(hash: u8, included_at: u64, external_height: u64) -> PendingAnchor {
        PendingAnchor {
            external_tx_hash: [hash; 32],
            external_block_height: included_at,
            local_block_height: 15,
            local_block_hash: [1u8; 32],
            reward_address: [2u8; 20],
            signature_count: 2,
            creation_height: 45,
            confirmations: confirmations(external_height, included_at),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut tracker = PendingAnchorTracker::new();
        assert_eq!(tracker.insert(make_pending(1, 15, 15)), ObserveOutcome::Accepted);
        assert_eq!(tracker.insert(make_pending(1, 15, 15)), ObserveOutcome::AlreadyKnown);
        assert_eq!(tracker.insert(make_pending(1, 16, 16)), ObserveOutcome::Updated);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_promotion_threshold() {
        let mut tracker = PendingAnchorTracker::new();
        tracker.insert(make_pending(1, 10, 9));
        tracker.insert(make_pending(2, 12, 9));
        assert!(tracker.take_promotable(1).is_empty());

        tracker.recompute(10);
        let promoted = tracker.take_promotable(1);
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].confirmations, 1);
        assert_eq!(tracker.list()[0].external_tx_hash, [2u8; 32]);
    }

    #[test]
    fn test_validate_transaction_scenario() {
        let scenario = AuthScenario::new();
        let tx = scenario.transaction(2);
        let pending = validate_transaction(
            &tx,
            [7u8; 32],
            15,
            15,
            &scenario.chain,
            &scenario.team,
            ZERO_HASH,
            &scenario.params,
        )
        .unwrap();
        assert_eq!(pending.signature_count, 2);
        assert_eq!(pending.confirmations, 1);
        assert_eq!(pending.creation_height, 45);
        assert_eq!(pending.local_block_height, 15);
    }

    #[test]
    fn test_validate_transaction_quorum_not_met() {
        let scenario = AuthScenario::new();
        let tx = scenario.transaction(1);
        let err = validate_transaction(
            &tx,
            [7u8; 32],
            15,
            15,
            &scenario.chain,
            &scenario.team,
            ZERO_HASH,
            &scenario.params,
        )
        .unwrap_err();
        assert!(matches!(err, AnchorError::QuorumNotMet { have: 1, need: 2 }));
    }

    #[test]
    fn test_validate_transaction_duplicate_signer() {
        let scenario = AuthScenario::new();
        let mut tx = scenario.transaction(2);
        tx.payload.auths[1] = tx.payload.auths[0].clone();
        let err = validate_transaction(
            &tx,
            [7u8; 32],
            15,
            15,
            &scenario.chain,
            &scenario.team,
            ZERO_HASH,
            &scenario.params,
        )
        .unwrap_err();
        assert!(matches!(err, AnchorError::MalformedPayload { .. }));
    }

    #[test]
    fn test_validate_transaction_wrong_previous_anchor() {
        let scenario = AuthScenario::new();
        let tx = scenario.transaction_with_previous(2, [5u8; 32]);
        let err = validate_transaction(
            &tx,
            [7u8; 32],
            15,
            15,
            &scenario.chain,
            &scenario.team,
            ZERO_HASH,
            &scenario.params,
        )
        .unwrap_err();
        assert!(matches!(err, AnchorError::MalformedPayload { .. }));

        // Naming the expected predecessor passes.
        let pending = validate_transaction(
            &tx,
            [7u8; 32],
            15,
            15,
            &scenario.chain,
            &scenario.team,
            [5u8; 32],
            &scenario.params,
        )
        .unwrap();
        assert_eq!(pending.local_block_height, 15);
    }
}
