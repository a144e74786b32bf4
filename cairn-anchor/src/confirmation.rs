use std::cmp::Ordering;

use cairn_types::anchor::Anchor;

use crate::params::{AnchorParams, TieBreak};

/// Confirmations of a transaction included at `included_at` when the external
/// chain is at `external_height`. Zero if the inclusion block is not known.
pub fn confirmations(external_height: u64, included_at: u64) -> u64 {
    if external_height >= included_at {
        external_height - included_at + 1
    } else {
        0
    }
}

/// Depth thresholds and the ranking of competing anchors.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationEngine {
    promote_depth: u64,
    activate_depth: u64,
    tie_break: TieBreak,
}

impl ConfirmationEngine {
    pub fn new(params: &AnchorParams) -> Self {
        Self {
            promote_depth: params.promote_depth,
            activate_depth: params.activate_depth,
            tie_break: params.tie_break,
        }
    }

    pub fn promote_depth(&self) -> u64 {
        self.promote_depth
    }

    pub fn can_activate(&self, confirmations: u64) -> bool {
        confirmations >= self.activate_depth
    }

    /// Order two candidates for the same local height; `Less` means `a` wins.
    ///
    /// A rewarded anchor always wins, then the higher signature count, then
    /// the configured external-height rule, then the lower tx hash.
    pub fn rank(&self, a: &Anchor, a_rewarded: bool, b: &Anchor, b_rewarded: bool) -> Ordering {
        b_rewarded
            .cmp(&a_rewarded)
            .then_with(|| b.signature_count.cmp(&a.signature_count))
            .then_with(|| match self.tie_break {
                TieBreak::EarliestExternalHeight => {
                    a.external_block_height.cmp(&b.external_block_height)
                }
                TieBreak::LatestExternalHeight => {
                    b.external_block_height.cmp(&a.external_block_height)
                }
            })
            .then_with(|| a.external_tx_hash.cmp(&b.external_tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_anchor(hash: u8, external: u64, sigs: u32) -> Anchor {
        Anchor {
            external_block_height: external,
            external_tx_hash: [hash; 32],
            previous_anchor_tx_hash: [0u8; 32],
            local_block_height: 15,
            local_block_hash: [1u8; 32],
            reward_address: [2u8; 20],
            confirmations: 6,
            signature_count: sigs,
            creation_height: 45,
            active: false,
        }
    }

    #[test]
    fn test_confirmation_counts() {
        assert_eq!(confirmations(1, 1), 1);
        assert_eq!(confirmations(5, 1), 5);
        assert_eq!(confirmations(6, 1), 6);
        assert_eq!(confirmations(0, 1), 0);
    }

    #[test]
    fn test_activation_threshold() {
        let engine = ConfirmationEngine::new(&AnchorParams::default());
        assert!(!engine.can_activate(5));
        assert!(engine.can_activate(6));
        assert_eq!(engine.promote_depth(), 1);
    }

    #[test]
    fn test_rank_prefers_signatures_then_earliest() {
        let engine = ConfirmationEngine::new(&AnchorParams::default());
        let strong = make_anchor(9, 5, 3);
        let early = make_anchor(8, 1, 2);
        let late = make_anchor(1, 2, 2);
        assert_eq!(engine.rank(&strong, false, &early, false), Ordering::Less);
        assert_eq!(engine.rank(&early, false, &late, false), Ordering::Less);
        // A rewarded anchor keeps its place.
        assert_eq!(engine.rank(&late, true, &strong, false), Ordering::Less);
    }

    #[test]
    fn test_rank_latest_and_hash_fallback() {
        let params = AnchorParams {
            tie_break: TieBreak::LatestExternalHeight,
            ..Default::default()
        };
        let engine = ConfirmationEngine::new(&params);
        let early = make_anchor(1, 1, 2);
        let late = make_anchor(2, 2, 2);
        assert_eq!(engine.rank(&late, false, &early, false), Ordering::Less);

        let a = make_anchor(1, 1, 2);
        let b = make_anchor(2, 1, 2);
        assert_eq!(engine.rank(&a, false, &b, false), Ordering::Less);
    }

    proptest! {
        #[test]
        fn prop_confirmations_monotonic(included in 0u64..1_000_000, h1 in 0u64..1_000_000, step in 0u64..1_000) {
            prop_assert!(confirmations(h1 + step, included) >= confirmations(h1, included));
        }

        #[test]
        fn prop_confirmations_start_at_one(included in 0u64..1_000_000) {
            prop_assert_eq!(confirmations(included, included), 1);
        }
    }
}
