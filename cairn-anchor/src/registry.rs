use std::collections::BTreeMap;

use cairn_types::anchor::{Anchor, UnrewardedAnchor};
use cairn_types::primitives::*;

use crate::chain::LocalChain;
use crate::confirmation::{confirmations, ConfirmationEngine};
use crate::error::AnchorError;
use crate::payout::RewardLedger;

/// Changes produced by a registry recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub previous_active: Option<Hash>,
    pub active: Option<Hash>,
}

impl RecomputeSummary {
    pub fn active_changed(&self) -> bool {
        self.previous_active != self.active
    }
}

/// Promoted anchors, the active anchor and the unrewarded list.
#[derive(Debug, Clone, Default)]
pub struct AnchorRegistry {
    anchors: BTreeMap<Hash, Anchor>,
    active: Option<Hash>,
    unrewarded: Vec<UnrewardedAnchor>,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_anchors(anchors: Vec<Anchor>) -> Self {
        Self {
            anchors: anchors
                .into_iter()
                .map(|a| (a.external_tx_hash, a))
                .collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<&Anchor> {
        self.anchors.get(tx_hash)
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.anchors.contains_key(tx_hash)
    }

    /// Add a promoted anchor. Returns false if it was already present.
    pub fn insert(&mut self, anchor: Anchor) -> bool {
        if self.anchors.contains_key(&anchor.external_tx_hash) {
            return false;
        }
        self.anchors.insert(anchor.external_tx_hash, anchor);
        true
    }

    /// Remove every anchor included above `external_height`.
    pub fn take_above_external(&mut self, external_height: u64) -> Vec<Anchor> {
        let doomed: Vec<Hash> = self
            .anchors
            .values()
            .filter(|a| a.external_block_height > external_height)
            .map(|a| a.external_tx_hash)
            .collect();
        doomed
            .iter()
            .filter_map(|hash| self.anchors.remove(hash))
            .collect()
    }

    /// All anchors ordered by local height, then external height, then hash.
    pub fn list(&self) -> Vec<Anchor> {
        let mut anchors: Vec<Anchor> = self.anchors.values().cloned().collect();
        anchors.sort_by_key(|a| {
            (
                a.local_block_height,
                a.external_block_height,
                a.external_tx_hash,
            )
        });
        anchors
    }

    pub fn active(&self) -> Option<&Anchor> {
        self.active.as_ref().and_then(|hash| self.anchors.get(hash))
    }

    /// Local height of the active anchor, 0 if none.
    pub fn active_height(&self) -> u64 {
        self.active().map(|a| a.local_block_height).unwrap_or(0)
    }

    /// Unrewarded winners, oldest first.
    pub fn unrewarded(&self) -> &[UnrewardedAnchor] {
        &self.unrewarded
    }

    /// The anchor at the head of the unrewarded list.
    pub fn unrewarded_head(&self) -> Option<&Anchor> {
        self.unrewarded
            .first()
            .and_then(|u| self.anchors.get(&u.external_hash))
    }

    /// The rewarded anchor with the greatest local height below `height`.
    pub fn latest_rewarded_below(&self, height: u64, rewards: &RewardLedger) -> Option<&Anchor> {
        self.anchors
            .values()
            .filter(|a| a.local_block_height < height && rewards.contains(&a.external_tx_hash))
            .max_by_key(|a| a.local_block_height)
    }

    /// Tx hash a new anchor for `height` names as its predecessor, or
    /// `ZERO_HASH` when nothing below it was rewarded.
    pub fn expected_previous(&self, height: u64, rewards: &RewardLedger) -> Hash {
        self.latest_rewarded_below(height, rewards)
            .map(|a| a.external_tx_hash)
            .unwrap_or(ZERO_HASH)
    }

    /// Recompute confirmations, lineage, the active anchor and the unrewarded
    /// list from the current external height, local chain and reward ledger.
    pub fn recompute(
        &mut self,
        external_height: u64,
        chain: &LocalChain,
        rewards: &RewardLedger,
        engine: &ConfirmationEngine,
    ) -> RecomputeSummary {
        let previous_active = self.active;

        let lineage: Vec<(Hash, Hash)> = self
            .anchors
            .values()
            .map(|a| {
                (
                    a.external_tx_hash,
                    self.expected_previous(a.local_block_height, rewards),
                )
            })
            .collect();
        for (hash, previous) in lineage {
            if let Some(anchor) = self.anchors.get_mut(&hash) {
                anchor.previous_anchor_tx_hash = previous;
                anchor.confirmations = confirmations(external_height, anchor.external_block_height);
            }
        }

        // One winner per local height among deep enough, canonical anchors.
        let mut winners: BTreeMap<u64, &Anchor> = BTreeMap::new();
        for anchor in self.anchors.values() {
            if !engine.can_activate(anchor.confirmations)
                || !chain.is_canonical(anchor.local_block_height, &anchor.local_block_hash)
            {
                continue;
            }
            let rewarded = rewards.contains(&anchor.external_tx_hash);
            match winners.get(&anchor.local_block_height) {
                Some(best)
                    if engine
                        .rank(anchor, rewarded, best, rewards.contains(&best.external_tx_hash))
                        .is_ge() => {}
                _ => {
                    winners.insert(anchor.local_block_height, anchor);
                }
            }
        }

        let active = winners.values().next_back().map(|a| a.external_tx_hash);
        let max_rewarded = self
            .anchors
            .values()
            .filter(|a| rewards.contains(&a.external_tx_hash))
            .map(|a| a.local_block_height)
            .max();
        let unrewarded: Vec<UnrewardedAnchor> = winners
            .values()
            .filter(|a| max_rewarded.map_or(true, |m| a.local_block_height > m))
            .filter(|a| !rewards.contains(&a.external_tx_hash))
            .map(|a| UnrewardedAnchor {
                local_height: a.local_block_height,
                local_hash: a.local_block_hash,
                external_height: a.external_block_height,
                external_hash: a.external_tx_hash,
            })
            .collect();

        for anchor in self.anchors.values_mut() {
            anchor.active = Some(anchor.external_tx_hash) == active;
        }
        self.active = active;
        self.unrewarded = unrewarded;

        RecomputeSummary {
            previous_active,
            active,
        }
    }

    /// Check that reward records and anchor lineage agree.
    pub fn verify_lineage(&self, rewards: &RewardLedger) -> Result<(), AnchorError> {
        let mut last_height: Option<u64> = None;
        for record in rewards.list() {
            let anchor = self.anchors.get(&record.anchor_tx_hash).ok_or_else(|| {
                AnchorError::RollbackInconsistency {
                    reason: format!(
                        "reward {} references unknown anchor {}",
                        hex::encode(record.reward_tx_hash),
                        hex::encode(record.anchor_tx_hash)
                    ),
                }
            })?;
            if last_height.is_some_and(|h| anchor.local_block_height <= h) {
                return Err(AnchorError::RollbackInconsistency {
                    reason: format!(
                        "anchor at height {} rewarded after a higher anchor",
                        anchor.local_block_height
                    ),
                });
            }
            last_height = Some(anchor.local_block_height);
        }

        if let Some(active) = self.active() {
            let expected = self.expected_previous(active.local_block_height, rewards);
            if active.previous_anchor_tx_hash != expected {
                return Err(AnchorError::RollbackInconsistency {
                    reason: format!(
                        "active anchor {} links to {} instead of {}",
                        hex::encode(active.external_tx_hash),
                        hex::encode(active.previous_anchor_tx_hash),
                        hex::encode(expected)
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AnchorParams;
    use crate::test_support::make_chain;
    use cairn_types::anchor::RewardRecord;

    fn make_anchor(chain: &LocalChain, hash: u8, local: u64, external: u64) -> Anchor {
        Anchor {
            external_block_height: external,
            external_tx_hash: [hash; 32],
            previous_anchor_tx_hash: ZERO_HASH,
            local_block_height: local,
            local_block_hash: chain.hash_at(local).unwrap(),
            reward_address: [hash; 20],
            confirmations: 0,
            signature_count: 2,
            creation_height: local + 30,
            active: false,
        }
    }

    fn reward(anchor: u8, local_height: u64) -> RewardRecord {
        RewardRecord {
            anchor_tx_hash: [anchor; 32],
            reward_tx_hash: [anchor + 100; 32],
            local_height,
            local_hash: [0u8; 32],
        }
    }

    fn engine() -> ConfirmationEngine {
        ConfirmationEngine::new(&AnchorParams::default())
    }

    #[test]
    fn test_activation_at_depth() {
        let (chain, _, _) = make_chain(3, 80);
        let mut registry = AnchorRegistry::new();
        registry.insert(make_anchor(&chain, 1, 15, 1));
        let rewards = RewardLedger::new();

        registry.recompute(5, &chain, &rewards, &engine());
        assert!(registry.active().is_none());
        assert!(registry.unrewarded().is_empty());
        assert_eq!(registry.list()[0].confirmations, 5);

        let summary = registry.recompute(6, &chain, &rewards, &engine());
        assert!(summary.active_changed());
        assert_eq!(registry.active().unwrap().external_tx_hash, [1u8; 32]);
        assert_eq!(registry.unrewarded().len(), 1);
        assert_eq!(registry.active_height(), 15);
    }

    #[test]
    fn test_single_active_and_tie_break() {
        let (chain, _, _) = make_chain(3, 80);
        let mut registry = AnchorRegistry::new();
        registry.insert(make_anchor(&chain, 2, 15, 1));
        registry.insert(make_anchor(&chain, 1, 15, 2));
        registry.insert(make_anchor(&chain, 3, 30, 3));
        let rewards = RewardLedger::new();

        registry.recompute(7, &chain, &rewards, &engine());
        // Height 30 is only at 5 confirmations; the earliest height-15 anchor wins.
        assert_eq!(registry.active().unwrap().external_tx_hash, [2u8; 32]);
        assert_eq!(registry.list().iter().filter(|a| a.active).count(), 1);

        registry.recompute(8, &chain, &rewards, &engine());
        assert_eq!(registry.active().unwrap().external_tx_hash, [3u8; 32]);
        let unrewarded: Vec<u64> = registry.unrewarded().iter().map(|u| u.local_height).collect();
        assert_eq!(unrewarded, vec![15, 30]);
        assert_eq!(registry.unrewarded_head().unwrap().external_tx_hash, [2u8; 32]);
    }

    #[test]
    fn test_lineage_follows_rewards() {
        let (chain, _, _) = make_chain(3, 80);
        let mut registry = AnchorRegistry::new();
        registry.insert(make_anchor(&chain, 1, 15, 1));
        registry.insert(make_anchor(&chain, 2, 30, 2));
        let mut rewards = RewardLedger::new();
        rewards.insert(reward(1, 47));

        registry.recompute(10, &chain, &rewards, &engine());
        let active = registry.active().unwrap();
        assert_eq!(active.external_tx_hash, [2u8; 32]);
        assert_eq!(active.previous_anchor_tx_hash, [1u8; 32]);
        assert_eq!(registry.unrewarded().len(), 1);
        registry.verify_lineage(&rewards).unwrap();
    }

    #[test]
    fn test_orphaned_block_is_not_a_winner() {
        let (chain, _, _) = make_chain(3, 80);
        let mut registry = AnchorRegistry::new();
        let mut orphan = make_anchor(&chain, 1, 15, 1);
        orphan.local_block_hash = [0xEE; 32];
        registry.insert(orphan);
        registry.recompute(10, &chain, &RewardLedger::new(), &engine());
        assert!(registry.active().is_none());
    }

    #[test]
    fn test_verify_lineage_detects_missing_anchor() {
        let registry = AnchorRegistry::new();
        let mut rewards = RewardLedger::new();
        rewards.insert(reward(9, 47));
        assert!(matches!(
            registry.verify_lineage(&rewards),
            Err(AnchorError::RollbackInconsistency { .. })
        ));
    }

    #[test]
    fn test_take_above_external() {
        let (chain, _, _) = make_chain(3, 80);
        let mut registry = AnchorRegistry::new();
        registry.insert(make_anchor(&chain, 1, 15, 1));
        registry.insert(make_anchor(&chain, 2, 30, 5));
        let removed = registry.take_above_external(3);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].external_tx_hash, [2u8; 32]);
        assert_eq!(registry.len(), 1);
    }
}
